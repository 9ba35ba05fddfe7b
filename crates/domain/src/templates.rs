use serde::{Deserialize, Serialize};

/// Board templates. Creating a board instantiates the template's lists at
/// positions `0..k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoardTemplate {
    Kanban,
    Sprint,
    Personal,
    Bugs,
}

impl BoardTemplate {
    pub const ALL: [BoardTemplate; 4] = [
        BoardTemplate::Kanban,
        BoardTemplate::Sprint,
        BoardTemplate::Personal,
        BoardTemplate::Bugs,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BoardTemplate::Kanban => "kanban",
            BoardTemplate::Sprint => "sprint",
            BoardTemplate::Personal => "personal",
            BoardTemplate::Bugs => "bugs",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "kanban" => Some(BoardTemplate::Kanban),
            "sprint" => Some(BoardTemplate::Sprint),
            "personal" => Some(BoardTemplate::Personal),
            "bugs" => Some(BoardTemplate::Bugs),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            BoardTemplate::Kanban => "Kanban Básico",
            BoardTemplate::Sprint => "Sprint Agile",
            BoardTemplate::Personal => "Pessoal",
            BoardTemplate::Bugs => "Controle de Bugs",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            BoardTemplate::Kanban => "Template padrão com fluxo básico de trabalho",
            BoardTemplate::Sprint => "Template para metodologia ágil com sprint planning",
            BoardTemplate::Personal => "Template para gerenciamento de tarefas pessoais",
            BoardTemplate::Bugs => "Template para rastreamento e correção de bugs",
        }
    }

    /// List names in display order; the index is the initial position.
    pub fn list_names(self) -> &'static [&'static str] {
        match self {
            BoardTemplate::Kanban => &["A Fazer", "Em Progresso", "Revisão", "Concluído"],
            BoardTemplate::Sprint => &[
                "Backlog",
                "Sprint Planning",
                "Em Desenvolvimento",
                "Em Teste",
                "Deploy",
                "Finalizado",
            ],
            BoardTemplate::Personal => &["Ideias", "Para Hoje", "Esta Semana", "Feito"],
            BoardTemplate::Bugs => &[
                "Reportados",
                "Em Análise",
                "Em Correção",
                "Em Teste",
                "Corrigidos",
            ],
        }
    }
}

impl Default for BoardTemplate {
    fn default() -> Self {
        BoardTemplate::Kanban
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub fn available_templates() -> Vec<TemplateInfo> {
    BoardTemplate::ALL
        .iter()
        .map(|t| TemplateInfo {
            id: t.as_str(),
            name: t.display_name(),
            description: t.description(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kanban_template_has_four_lists_in_order() {
        let names = BoardTemplate::Kanban.list_names();
        assert_eq!(names, &["A Fazer", "Em Progresso", "Revisão", "Concluído"]);
    }

    #[test]
    fn every_template_is_listed_and_parseable() {
        let infos = available_templates();
        assert_eq!(infos.len(), BoardTemplate::ALL.len());
        for info in infos {
            assert!(BoardTemplate::parse(info.id).is_some());
        }
    }

    #[test]
    fn unknown_template_is_rejected() {
        assert_eq!(BoardTemplate::parse("scrumban"), None);
    }
}
