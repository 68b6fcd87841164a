pub mod agent;
pub mod calendar_service;
pub mod conversation;
pub mod openai_service;
pub mod slots;
