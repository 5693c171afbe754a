//! 内容分类器
//!
//! 纯函数：链接提取 + 白名单判断，提及集合计数。

use std::collections::BTreeSet;

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::MessageEvent;

lazy_static! {
    /// 链接匹配规则（按顺序应用，结果取并集，允许重复）
    static ref LINK_PATTERNS: Vec<Regex> = vec![
        // 完整 URL
        Regex::new(r"https?://[-\w.]+(?::[0-9]+)?(?:/[\w/_.]*(?:\?[\w&=%.]*)?(?:#[\w.]*)?)?")
            .expect("invalid url pattern"),
        // www. 前缀主机
        Regex::new(r"www\.[-\w.]+(?::[0-9]+)?(?:/[\w/_.]*(?:\?[\w&=%.]*)?(?:#[\w.]*)?)?")
            .expect("invalid www pattern"),
        // 聊天邀请链接
        Regex::new(r"(?:discord\.gg|discordapp\.com/invite)/[a-zA-Z0-9]+")
            .expect("invalid invite pattern"),
        // 通用 host.tld 形式
        Regex::new(
            r"[a-zA-Z0-9-]+\.(?:com|net|org|fr|be|ca|uk|de|es|it|pl|ru|jp|br|mx|au|nl|se|no|dk|fi|ch|at|pt|gr|cz|hu|bg|ro|hr|sk|si|ee|lv|lt|ie|lu|mt|cy)(?:/[^\s]*)?"
        )
        .expect("invalid host pattern"),
    ];
}

/// 提取消息中的链接（先转小写）
pub fn extract_links(content: &str) -> Vec<String> {
    let lowered = content.to_lowercase();
    LINK_PATTERNS
        .iter()
        .flat_map(|pattern| pattern.find_iter(&lowered).map(|m| m.as_str().to_string()))
        .collect()
}

/// 链接是否被允许
///
/// 只要链接以子串形式包含任一白名单域名即视为允许，不做精确主机匹配。
/// `http://evil.com/github.com` 因此也会被放行，这是已知的宽松行为。
pub fn is_allowed_link(link: &str, allowed_domains: &BTreeSet<String>) -> bool {
    let link = link.to_lowercase();
    allowed_domains
        .iter()
        .any(|domain| link.contains(&domain.to_lowercase()))
}

/// 返回所有未被白名单放行的链接
pub fn disallowed_links(content: &str, allowed_domains: &BTreeSet<String>) -> Vec<String> {
    extract_links(content)
        .into_iter()
        .filter(|link| !is_allowed_link(link, allowed_domains))
        .collect()
}

/// 提及数：用户提及与角色提及的并集大小
pub fn mention_count(event: &MessageEvent) -> usize {
    event.mention_set().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(domains: &[&str]) -> BTreeSet<String> {
        domains.iter().map(|d| d.to_string()).collect()
    }

    #[test]
    fn test_extracts_each_link_form() {
        assert!(extract_links("see https://example.com/a/b?x=1")
            .contains(&"https://example.com/a/b?x=1".to_string()));
        assert!(extract_links("go to www.example.io/path")
            .contains(&"www.example.io/path".to_string()));
        assert!(extract_links("join discord.gg/AbC123")
            .contains(&"discord.gg/abc123".to_string()));
        assert!(extract_links("visit shop.fr/promo now")
            .contains(&"shop.fr/promo".to_string()));
    }

    #[test]
    fn test_plain_text_has_no_links() {
        assert!(extract_links("hello there, how are you?").is_empty());
        assert!(extract_links("").is_empty());
    }

    #[test]
    fn test_extraction_is_case_insensitive() {
        let links = extract_links("HTTPS://EXAMPLE.COM");
        assert!(links.contains(&"https://example.com".to_string()));
    }

    #[test]
    fn test_subdomain_of_allowed_domain_passes() {
        let allowed = allow(&["github.com"]);
        assert!(disallowed_links("check https://sub.github.com/repo", &allowed).is_empty());
    }

    #[test]
    fn test_allowed_domain_embedded_in_path_passes() {
        // 子串规则：白名单域名出现在路径里同样放行
        let allowed = allow(&["github.com"]);
        assert!(disallowed_links("visit http://evil.com/github.com", &allowed).is_empty());
    }

    #[test]
    fn test_unlisted_domain_is_reported() {
        let allowed = allow(&["github.com"]);
        let bad = disallowed_links("free nitro at discord.gg/scam1", &allowed);
        assert_eq!(bad, vec!["discord.gg/scam1".to_string()]);
    }

    #[test]
    fn test_allow_list_match_ignores_case() {
        let allowed = allow(&["GitHub.com"]);
        assert!(is_allowed_link("https://github.com/x", &allowed));
    }

    #[test]
    fn test_mention_union_counts_unique_ids() {
        let event = MessageEvent::new(1, 2, 3, 4, "@a @b @c")
            .with_user_mentions([11, 12, 13])
            .with_user_mentions([11, 12, 13])
            .with_user_mentions([11, 12, 13]);
        assert_eq!(mention_count(&event), 3);

        let with_roles = event.with_role_mentions([50, 51]);
        assert_eq!(mention_count(&with_roles), 5);

        // 角色 ID 与用户 ID 数值相同时只算一次
        let overlapping = with_roles.with_role_mentions([12]);
        assert_eq!(mention_count(&overlapping), 5);
    }
}
