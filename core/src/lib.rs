pub mod chat;
pub mod flow;
pub mod message;
pub mod simulation;

pub use chat::{Chat, Organization, Skill, SkillMaterial, User};
pub use flow::{EnhancedNode, FlowNode, InteractionType, NodeContent};
pub use message::{
    AnswerPayload, ChatData, ChatRole, Message, MessagePayload, MessageRequest, MessageType,
};
pub use simulation::{Simulation, SimulationKind, SimulationMode};
