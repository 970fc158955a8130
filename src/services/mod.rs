pub mod chat_service;
pub mod geolocation_service;
pub mod intent_service;
pub mod openrouter_service;
pub mod places_service;
pub mod plan_service;
pub mod planner_service;
pub mod profile_service;
pub mod social_service;
