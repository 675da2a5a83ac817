mod generate_completion;

pub use generate_completion::GenerateCompletion;
