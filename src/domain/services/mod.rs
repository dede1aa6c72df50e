pub mod gemini;
pub mod id_generator;
pub mod providers;
pub mod rag;
