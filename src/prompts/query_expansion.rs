//! Query expansion prompts.
//!
//! Asks the model for Korean academic search keywords as a bare JSON array.

/// System prompt for search keyword expansion
pub const SYSTEM_PROMPT: &str = r#"You help researchers search Korean academic databases (KCI, RISS).
Given a user's free-text search request, produce short search keywords that a database title or keyword search would match.

Rules you MUST follow:
- Write keywords in Korean unless the request itself is in English.
- Remove stopwords and filler ("연구", "관련", "논문" alone are not keywords).
- Include synonyms and closely related terms.
- Output MUST be a JSON array of strings only (no markdown, no extra text)."#;

/// User prompt template for one query
/// Placeholders: {query}
pub const USER_PROMPT_TEMPLATE: &str = r#"사용자가 다음과 같이 검색했습니다: "{query}"
한국어 학술 데이터베이스 검색에 적합하도록 핵심 키워드 5~8개를 생성하세요.
불용어 제거, 동의어와 관련어를 포함하세요.
JSON 배열(list) 형태로만 출력하세요."#;

/// Build user prompt for a query
pub fn build_user_prompt(query: &str) -> String {
    USER_PROMPT_TEMPLATE.replace("{query}", query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_user_prompt() {
        let prompt = build_user_prompt("청년 고용 정책");
        assert!(prompt.contains("\"청년 고용 정책\""));
        assert!(!prompt.contains("{query}"));
    }
}
