pub mod face_engine;
pub mod face_match;
pub mod image_source;
pub mod jwt;
pub mod kyc_service;
