use std::path::{Path, PathBuf};

use crate::core::language::Language;
use crate::utils::text::slug;

/// Output tree of one summary under the principal output folder:
///
/// ```text
/// {root}/{base}/HISTORIAS_PT/
/// {root}/{base}/HISTORIAS_{code}/
/// {root}/{base}/IMAGENS/
/// {root}/{base}/PROMPTS/
/// ```
#[derive(Debug, Clone)]
pub struct SummaryLayout {
    dir: PathBuf,
    base: String,
}

impl SummaryLayout {
    pub fn new(output_root: &Path, base: &str) -> Self {
        Self {
            dir: output_root.join(base),
            base: base.to_string(),
        }
    }

    pub fn stories_pt(&self) -> PathBuf {
        self.dir.join("HISTORIAS_PT")
    }

    pub fn stories(&self, language: Language) -> PathBuf {
        self.dir.join(format!("HISTORIAS_{}", language.code()))
    }

    pub fn images(&self) -> PathBuf {
        self.dir.join("IMAGENS")
    }

    pub fn prompts(&self) -> PathBuf {
        self.dir.join("PROMPTS")
    }

    pub fn titles_file(&self) -> PathBuf {
        self.stories_pt().join(format!("{}_titulos_gerados.txt", self.base))
    }

    pub fn titles_error_file(&self) -> PathBuf {
        self.stories_pt().join(format!("{}_titulos_ERRO.txt", self.base))
    }

    /// `index` is 1-based.
    pub fn chapter_error_file(&self, index: usize) -> PathBuf {
        self.stories_pt()
            .join(format!("{}_parte_{}_ERRO.txt", self.base, index))
    }

    pub fn story_file(&self) -> PathBuf {
        self.stories_pt()
            .join(format!("{}_roteiro_completo_pt_com_cta.txt", self.base))
    }

    pub fn translated_story_file(&self, language: Language) -> PathBuf {
        self.stories(language).join(format!(
            "{}_roteiro_traduzido_{}.txt",
            self.base,
            language.code()
        ))
    }

    pub fn name_map_file(&self, language: Language) -> PathBuf {
        self.prompts().join(format!(
            "{}_mapeamento_nomes_{}.json",
            self.base,
            language.code()
        ))
    }

    pub fn reference_prompt_file(&self, character: &str) -> PathBuf {
        self.prompts().join(format!(
            "{}_personagem_{}_prompt_referencia.txt",
            self.base,
            slug(character)
        ))
    }

    /// `n` is 1-based.
    pub fn image_prompt_file(&self, character: &str, n: usize) -> PathBuf {
        self.prompts().join(format!("{}.txt", self.image_stem(character, n)))
    }

    /// Grid files are derived from this stem by the fetcher.
    pub fn image_file(&self, character: &str, n: usize) -> PathBuf {
        self.images().join(format!("{}.png", self.image_stem(character, n)))
    }

    fn image_stem(&self, character: &str, n: usize) -> String {
        format!("{}_personagem_{}_prompt{}", self.base, slug(character), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let layout = SummaryLayout::new(Path::new("out"), "carta");
        assert_eq!(
            layout.story_file(),
            Path::new("out/carta/HISTORIAS_PT/carta_roteiro_completo_pt_com_cta.txt")
        );
        assert_eq!(
            layout.translated_story_file(Language::Italiano),
            Path::new("out/carta/HISTORIAS_italiano/carta_roteiro_traduzido_italiano.txt")
        );
        assert_eq!(
            layout.name_map_file(Language::EspanholMx),
            Path::new("out/carta/PROMPTS/carta_mapeamento_nomes_espanhol_mx.json")
        );
        assert_eq!(
            layout.chapter_error_file(3),
            Path::new("out/carta/HISTORIAS_PT/carta_parte_3_ERRO.txt")
        );
        assert_eq!(
            layout.image_file("Ana Clara", 2),
            Path::new("out/carta/IMAGENS/carta_personagem_Ana_Clara_prompt2.png")
        );
        assert_eq!(
            layout.reference_prompt_file("Ana"),
            Path::new("out/carta/PROMPTS/carta_personagem_Ana_prompt_referencia.txt")
        );
    }
}
