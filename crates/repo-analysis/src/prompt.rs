//! Prompt assembly for feature analysis

use crate::SourceFile;

/// Instructions given to the model for every analysis.
pub const SYSTEM_PROMPT: &str = "You are an AI assistant specialized in reading code, determining whether certain features \
have been implemented, and providing expert-level code feedback. You have access to relevant \
code snippets or entire code files. Your job is to:\n\n\
1. Identify whether a feature request or specification is implemented in the provided code.\n\
2. Summarize the findings accurately.\n\
3. Provide constructive, clear, and actionable feedback on how to improve the code, if necessary.\n\n\
When responding, follow this structure:\n\
1) Implementation Status: Is the feature fully implemented, partially, or not at all?\n\
2) Detailed Explanation: Summarize the relevant parts of the code or logic.\n\
3) Feedback / Suggestions: Provide concise tips for improvement.\n\n\
Be concise but thorough, and stay within the provided code context. Use a professional tone, \
and if anything is ambiguous, highlight what is missing. Avoid speculation beyond the given snippets.";

/// One `File:` block per source file.
pub fn file_context(files: &[SourceFile]) -> String {
    files
        .iter()
        .map(|f| format!("File: {}\n```\n{}\n```\n", f.path, f.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// User message: the feature under question followed by the file context.
pub fn user_prompt(feature: &str, files: &[SourceFile]) -> String {
    let feature = feature.trim();
    let ask = if feature.is_empty() {
        "Analyze the following code and describe which features are implemented and their state."
            .to_string()
    } else {
        format!(
            "Analyze the following code and explain whether this feature is implemented and how complete it is: {feature}"
        )
    };
    format!("{ask}\n\n{}", file_context(files))
}
