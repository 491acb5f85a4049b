//! Functional prompts of every LLM stage.
//!
//! The base language of generated stories is Portuguese; image prompts are
//! authored in English because the image model expects it.

use crate::core::language::{Language, NameCandidates};

/// Marks where the text to translate starts in a translation prompt.
pub const TRANSLATION_TEXT_HEADER: &str = "Texto para tradução:\n";

const PHOTO_STYLE: &str = "shadows that enhance the expression, soft light on the face. \
Created using: Canon EOS R5, f/2.8 aperture, Caravaggio-inspired lighting, high-resolution details, \
hyperrealistic details, 8K resolution, high definition, photorealistic textures, natural lighting, \
depth of field, intricate detailed details.";

const IMAGE_FLAGS: &str = "--ar 16:9 --v 6.1 --style raw";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: &'static str,
    pub user: String,
}

pub fn chapter_titles(premise: &str, count: usize) -> Prompt {
    Prompt {
        system: "Você é um roteirista que estrutura narrativas longas em capítulos.",
        user: format!(
            "Com base no resumo abaixo, crie exatamente {count} títulos de capítulos concisos.\n\
             Liste-os numerados de 1 a {count}, um por linha, no formato \"N. Título\".\n\
             Não escreva nada além da lista.\n\n\
             Resumo da História:\n{premise}"
        ),
    }
}

pub fn chapter(
    premise: &str,
    numbered_titles: &str,
    previous: &str,
    index: usize,
    title: &str,
) -> Prompt {
    let mut user = format!(
        "Estamos escrevendo uma história capítulo por capítulo.\n\n\
         Resumo Geral da História:\n{premise}\n\n\
         Lista Completa de Títulos dos Capítulos:\n{numbered_titles}\n\n"
    );
    if previous.is_empty() {
        user.push_str("Este é o início da história.\n");
    } else {
        user.push_str(&format!(
            "--- INÍCIO DA PARTE ANTERIOR (PARTE {prev}) ---\n{previous}\n\
             --- FIM DA PARTE ANTERIOR (PARTE {prev}) ---\n\n\
             Continue a história a partir da parte anterior.\n",
            prev = index - 1
        ));
    }
    user.push_str(&format!(
        "Escreva agora o conteúdo completo e extenso do CAPÍTULO {index}: '{title}'.\n\
         Narrativa fluida em terceira pessoa, com eventos, diálogos e emoções.\n\
         NÃO repita o título do capítulo no texto. Responda APENAS com a prosa deste capítulo."
    ));
    Prompt {
        system: "Você é um escritor de histórias continuadas que desenvolve capítulos de forma coesa e sequencial.",
        user,
    }
}

pub fn call_to_action(story_tail: &str) -> Prompt {
    Prompt {
        system: "Você é um redator focado em engajar o público sênior (55+).",
        user: format!(
            "Escreva uma Call to Action breve para o final do roteiro abaixo, convidando o público \
             a comentar, compartilhar e se inscrever no canal, no mesmo tom emocional da história.\n\
             Responda APENAS com o texto da Call to Action.\n\n\
             Trecho final da história:\n...\n{story_tail}"
        ),
    }
}

pub fn name_mapping(text: &str, candidates: &NameCandidates, language: Language) -> Prompt {
    let target = language.display_name().to_uppercase();
    Prompt {
        system: "Você identifica nomes de personagens em narrativas e sugere substituições consistentes para um idioma.",
        user: format!(
            "Analise a história em português abaixo:\n\
             --- HISTÓRIA ---\n{text}\n--- FIM DA HISTÓRIA ---\n\n\
             1. Identifique todos os nomes próprios de personagens e infira o sexo (masculino ou feminino).\n\
             2. Para CADA nome, escolha um nome novo e DIFERENTE da lista do sexo correspondente para {target}.\n\
             O mesmo nome original deve ser SEMPRE mapeado para o MESMO nome novo.\n\n\
             Nomes Masculinos: {male}\n\
             Nomes Femininos: {female}\n\n\
             Responda APENAS com JSON no formato:\n\
             {{\"mapeamento_nomes\": [{{\"nome_original\": \"...\", \"novo_nome\": \"...\", \"sexo_inferido\": \"masculino\"}}]}}",
            male = candidates.masculino.join(", "),
            female = candidates.feminino.join(", "),
        ),
    }
}

pub fn translation(text: &str, language: Language) -> Prompt {
    let target = language.display_name().to_uppercase();
    let header = TRANSLATION_TEXT_HEADER;
    Prompt {
        system: "Você é um tradutor especialista.",
        user: format!(
            "Traduza o texto abaixo para {target}.\n\
             Preserve parágrafos e quebras de linha.\n\
             Os nomes de personagens já foram adaptados: mantenha-os exatamente como estão.\n\
             Responda APENAS com o texto traduzido.\n\n\
             {header}{text}"
        ),
    }
}

pub fn principal_characters(text: &str) -> Prompt {
    Prompt {
        system: "Você é um analista de narrativas que identifica os protagonistas de uma história.",
        user: format!(
            "Identifique os 2 personagens principais da história abaixo (normalmente o casal central).\n\
             Responda APENAS com os nomes separados por vírgula, por exemplo: PersonagemA, PersonagemB.\n\
             Se houver apenas um protagonista claro, responda só esse nome.\n\n\
             História:\n{text}"
        ),
    }
}

pub fn character_description(name: &str, text: &str) -> Prompt {
    Prompt {
        system: "Você é um escritor especializado em descrições de personagens.",
        user: format!(
            "Com base na história abaixo, escreva uma descrição visual e cinematográfica de {name}: \
             idade aproximada, características físicas, roupas típicas, postura e presença.\n\
             Use parágrafos fluidos, sem listas.\n\n\
             História:\n{text}"
        ),
    }
}

pub fn character_image(name: &str, description: &str) -> Prompt {
    Prompt {
        system: "Você cria descrições visuais de personagens para prompts de geração de imagem.",
        user: format!(
            "A partir da descrição de {name} abaixo, escreva UMA frase EM INGLÊS, concisa e visual, \
             para um prompt de imagem: idade aparente, traços físicos, roupa, cenário e tom emocional.\n\
             Exemplo: \"A woman in her early 30s with curly brown hair, wearing a soft beige dress, \
             in a cozy sunlit cafe, thoughtful and serene mood.\"\n\n\
             Descrição de {name}:\n{description}"
        ),
    }
}

/// Wraps the English visual sentence in the fixed photographic style.
/// `--cref {url}` goes right before the trailing flags.
pub fn compose_image_prompt(visual: &str, cref: Option<&str>) -> String {
    let visual = visual.trim().trim_end_matches('.');
    let base = format!("image prompt: An ultra-realistic image. {}. {}", visual, PHOTO_STYLE);
    match cref {
        Some(url) => format!("{} --cref {} {}", base, url, IMAGE_FLAGS),
        None => format!("{} {}", base, IMAGE_FLAGS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_image_prompt_with_and_without_reference() {
        let plain = compose_image_prompt("A tall man in a grey coat.", None);
        assert!(plain.starts_with("image prompt: An ultra-realistic image. A tall man in a grey coat. "));
        assert!(plain.ends_with(" --ar 16:9 --v 6.1 --style raw"));
        assert!(!plain.contains("--cref"));

        let with_ref = compose_image_prompt("A tall man", Some("https://cdn/x.png"));
        assert!(with_ref.ends_with("--cref https://cdn/x.png --ar 16:9 --v 6.1 --style raw"));
    }

    #[test]
    fn test_chapter_prompt_carries_previous_text() {
        let first = chapter("premissa", "1. A\n2. B", "", 1, "A");
        assert!(first.user.contains("Este é o início da história."));

        let second = chapter("premissa", "1. A\n2. B", "texto anterior", 2, "B");
        assert!(second.user.contains("(PARTE 1) ---\ntexto anterior\n"));
        assert!(second.user.contains("CAPÍTULO 2: 'B'"));
    }

    #[test]
    fn test_translation_text_is_last() {
        let prompt = translation("Ciao\n\nmondo", Language::Italiano);
        assert!(prompt.user.contains("ITALIANO"));
        let (_, text) = prompt.user.split_once(TRANSLATION_TEXT_HEADER).unwrap();
        assert_eq!(text, "Ciao\n\nmondo");
    }
}
