pub mod anthropic;
pub mod claude_cli;
pub mod gemini;
pub mod ollama;
pub mod openai;
