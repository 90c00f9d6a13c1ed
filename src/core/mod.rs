pub mod assembler;
pub mod candidate_store;
pub mod config;
pub mod document_parser;
pub mod errors;
pub mod field_extractor;
pub mod gmail;
pub mod google_sheets;
pub mod jd_matcher;
pub mod json_store;
pub mod models;
pub mod notifications;
pub mod ocr;
pub mod pdf;
pub mod review;
pub mod roles;
pub mod service;
pub mod whatsapp;
