//! Built-in analysis catalog and the fixed transcript texts.
//!
//! Every string the workflow writes into the transcript on its own behalf
//! lives here, next to the question catalog, so wording changes touch one
//! file. Order inside [`QUESTION_CATALOG`] is significant: groups and
//! questions are asked exactly in this order.

/// A named group of questions asked together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionGroup {
    pub name: &'static str,
    pub questions: &'static [&'static str],
}

impl QuestionGroup {
    /// Transcript heading announcing the group.
    pub fn heading(&self) -> String {
        format!("## {}", self.name)
    }
}

/// The four groups asked after every successful run.
pub const QUESTION_CATALOG: &[QuestionGroup] = &[
    QuestionGroup {
        name: "Informações Básicas",
        questions: &[
            "Qual é o objeto da licitação (escopo ou finalidade da contratação)?",
            "Qual é a modalidade da licitação (concorrência, tomada de preços, convite etc.)?",
            "Qual é o valor estimado para a contratação?",
            "Em qual cidade será realizada a licitação?",
            "Em qual estado será realizada a licitação?",
        ],
    },
    QuestionGroup {
        name: "Datas e Prazos",
        questions: &[
            "Qual é o prazo de entrega?",
            "Qual é o horário de abertura da licitação?",
            "Qual é o prazo de validade da proposta?",
            "Qual é o cronograma do processo (prazos para submissão de propostas, impugnações, recursos e execução)?",
        ],
    },
    QuestionGroup {
        name: "Requisitos e Documentação",
        questions: &[
            "Quais são as documentações necessárias para habilitação?",
            "Quais são os critérios adicionais para habilitação (regularidade fiscal, qualificação jurídica, comprovação de capacidade técnica, etc.)?",
            "Quais são os requisitos técnicos e de qualificação (experiência mínima, comprovação de capacidade, etc.)?",
            "Quais são as garantias exigidas (garantia de proposta, garantia contratual, etc.)?",
        ],
    },
    QuestionGroup {
        name: "Critérios e Condições",
        questions: &[
            "Quais são os critérios de julgamento (menor preço, técnica e preço, melhor técnica etc.)?",
            "Qual é o número de casas decimais para proposta?",
            "Quais são as condições de pagamento?",
            "Quais são os critérios para desclassificação ou penalização de propostas?",
            "Quais são as penalidades e sanções em caso de descumprimento contratual?",
        ],
    },
];

/// Total number of questions in [`QUESTION_CATALOG`].
pub fn question_count() -> usize {
    QUESTION_CATALOG.iter().map(|g| g.questions.len()).sum()
}

// ── Fixed transcript texts ───────────────────────────────────────────────

/// System entry when a run ends without any usable document.
pub const NO_PROCESSED_FILES: &str = "Nenhum arquivo foi processado com sucesso para análise.";

/// System entry opening the automated analysis.
pub const ANALYSIS_STARTED: &str = "Iniciando análise detalhada do edital...";

/// Assistant entry introducing the automated analysis.
pub const ANALYSIS_INTRO: &str = "Vou analisar o edital em detalhes, extraindo as informações mais importantes. \
Este processo pode levar alguns minutos. As informações serão organizadas por categorias para facilitar a compreensão.";

/// Assistant entry closing the automated analysis.
pub const ANALYSIS_DONE: &str =
    "Análise do edital concluída. Você pode fazer perguntas adicionais sobre o documento.";

/// System entry for a follow-up question asked before any document is ready.
pub const NO_DOCUMENT_FOR_QUERY: &str = "Não há um documento processado para consulta.";

/// System entry for an analysis question that got no answer.
pub fn question_failed(question: &str) -> String {
    format!("Não foi possível obter resposta para: {}", question)
}

/// System entry for a failed follow-up question.
pub fn message_failed(error: &str) -> String {
    format!("Erro ao processar a mensagem: {}", error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_shape() {
        let names: Vec<&str> = QUESTION_CATALOG.iter().map(|g| g.name).collect();
        assert_eq!(
            names,
            vec![
                "Informações Básicas",
                "Datas e Prazos",
                "Requisitos e Documentação",
                "Critérios e Condições"
            ]
        );
        let sizes: Vec<usize> = QUESTION_CATALOG.iter().map(|g| g.questions.len()).collect();
        assert_eq!(sizes, vec![5, 4, 4, 5]);
        assert_eq!(question_count(), 18);
    }

    #[test]
    fn questions_are_unique() {
        let mut all: Vec<&str> = QUESTION_CATALOG
            .iter()
            .flat_map(|g| g.questions.iter().copied())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), question_count());
    }

    #[test]
    fn heading_uses_markdown_level_two() {
        assert_eq!(QUESTION_CATALOG[1].heading(), "## Datas e Prazos");
    }

    #[test]
    fn intro_is_one_paragraph() {
        assert!(ANALYSIS_INTRO.contains("minutos. As informações"));
    }

    #[test]
    fn failure_texts_embed_detail() {
        assert_eq!(
            question_failed("Qual é o prazo de entrega?"),
            "Não foi possível obter resposta para: Qual é o prazo de entrega?"
        );
        assert!(message_failed("HTTP 500").ends_with("HTTP 500"));
    }
}
