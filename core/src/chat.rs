use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::Message;
use crate::simulation::Simulation;

/// Organization a user belongs to; feeds localization and generator context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default = "default_localization")]
    pub localization: String,
}

fn default_localization() -> String {
    "en".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<Organization>,
}

/// Supporting material attached to a skill, forwarded to the generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillMaterial {
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// A trainable skill. `objectives` name the hyperparameters tracked for
/// chats practicing this skill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub objectives: Vec<String>,
    #[serde(default)]
    pub materials: Vec<SkillMaterial>,
}

/// Chat aggregate root. Terminal once `finished` is set or hearts run out;
/// hearts are never stored negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: Uuid,
    pub user: User,
    pub simulation: Simulation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skill: Option<Skill>,
    pub hearts: f64,
    pub finished: bool,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Chat {
    pub fn is_terminal(&self) -> bool {
        self.finished || self.hearts <= 0.0
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::SimulationKind;

    fn chat(hearts: f64, finished: bool) -> Chat {
        Chat {
            id: Uuid::now_v7(),
            user: User {
                id: Uuid::now_v7(),
                name: "Dana".into(),
                organization: None,
            },
            simulation: Simulation {
                id: Uuid::now_v7(),
                name: "Difficult conversations".into(),
                kind: SimulationKind::Predefined,
                nodes: Some(vec![]),
                enhanced_nodes: vec![],
                skill_id: None,
            },
            skill: None,
            hearts,
            finished,
            messages: vec![],
        }
    }

    #[test]
    fn terminal_when_out_of_hearts_or_finished() {
        assert!(!chat(3.0, false).is_terminal());
        assert!(chat(0.0, false).is_terminal());
        assert!(chat(5.0, true).is_terminal());
    }
}
