//! 排除策略
//!
//! 判断节点与文本是否参与翻译的纯谓词层，无状态、不抛错

use std::sync::OnceLock;

use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;
use url::Url;

use crate::config::constants;
use crate::dom::{ancestors, get_node_attr, get_node_name, get_parent_node};

/// 排除策略
pub struct ExclusionPolicy {
    /// 是否把隐藏内容视为可翻译
    include_hidden: bool,
    regex_cache: RegexCache,
}

/// 正则表达式缓存
#[derive(Default)]
struct RegexCache {
    url_regex: OnceLock<Regex>,
    email_regex: OnceLock<Regex>,
    uuid_regex: OnceLock<Regex>,
    hex_token_regex: OnceLock<Regex>,
    version_regex: OnceLock<Regex>,
}

impl ExclusionPolicy {
    pub fn new(include_hidden: bool) -> Self {
        Self {
            include_hidden,
            regex_cache: RegexCache::default(),
        }
    }

    /// 判断节点是否被排除
    ///
    /// 对任意文档状态的节点都可安全调用；已脱离文档的节点一律视为排除。
    pub fn is_excluded(&self, node: &Handle) -> bool {
        match &node.data {
            NodeData::Element { .. } => self.is_excluded_element(node),
            NodeData::Text { contents } => {
                let parent = match get_parent_node(node) {
                    Some(parent) => parent,
                    None => return true,
                };
                self.is_excluded_element(&parent) || self.is_excluded_text(&contents.borrow())
            }
            _ => true,
        }
    }

    /// 判断元素是否被排除（标签黑名单、退出标记、可见性）
    pub fn is_excluded_element(&self, element: &Handle) -> bool {
        let tag = match get_node_name(element) {
            Some(tag) => tag,
            // 非元素或已无法解析的节点
            None => return true,
        };

        if constants::SKIP_ELEMENTS.contains(&tag) {
            return true;
        }

        if Self::is_opted_out(element) {
            return true;
        }

        for ancestor in ancestors(element, 64) {
            if let Some(name) = get_node_name(&ancestor) {
                if constants::SKIP_ELEMENTS.contains(&name) {
                    return true;
                }
            }
            if Self::is_opted_out(&ancestor) {
                return true;
            }
        }

        if !self.include_hidden && Self::is_hidden(element) {
            return true;
        }

        false
    }

    /// 判断文本内容是否被排除
    pub fn is_excluded_text(&self, text: &str) -> bool {
        let trimmed = text.trim();

        if trimmed.chars().count() < constants::MIN_TEXT_LENGTH {
            return true;
        }

        if self.is_pure_symbols_or_numbers(trimmed) {
            return true;
        }

        if self.is_url(trimmed) {
            return true;
        }

        if self.is_email(trimmed) {
            return true;
        }

        if Self::has_comment_marker(trimmed) {
            return true;
        }

        if Self::is_bracket_only(trimmed) {
            return true;
        }

        if self.is_machine_token(trimmed) {
            return true;
        }

        false
    }

    /// 元素自身是否携带退出翻译标记
    fn is_opted_out(element: &Handle) -> bool {
        for attr in constants::OPT_OUT_ATTRS {
            if get_node_attr(element, attr).is_some() {
                return true;
            }
        }

        if let Some(translate) = get_node_attr(element, "translate") {
            if translate.eq_ignore_ascii_case("no") {
                return true;
            }
        }

        if let Some(class) = get_node_attr(element, "class") {
            if class
                .split_whitespace()
                .any(|c| c == constants::OPT_OUT_CLASS)
            {
                return true;
            }
        }

        false
    }

    /// 判断元素是否隐藏
    fn is_hidden(element: &Handle) -> bool {
        if get_node_attr(element, "hidden").is_some() {
            return true;
        }

        if let Some(aria_hidden) = get_node_attr(element, "aria-hidden") {
            if aria_hidden == "true" {
                return true;
            }
        }

        if let Some(style) = get_node_attr(element, "style") {
            let normalized: String = style
                .to_lowercase()
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            if normalized.contains("display:none") || normalized.contains("visibility:hidden") {
                return true;
            }
        }

        false
    }

    /// 纯数字、标点或空白
    fn is_pure_symbols_or_numbers(&self, text: &str) -> bool {
        text.chars()
            .all(|c| c.is_numeric() || c.is_ascii_punctuation() || c.is_whitespace())
    }

    /// URL 检查
    fn is_url(&self, text: &str) -> bool {
        if text.contains(char::is_whitespace) {
            return false;
        }

        if let Ok(url) = Url::parse(text) {
            if matches!(url.scheme(), "http" | "https" | "ftp" | "mailto" | "file") {
                return true;
            }
        }

        let url_regex = self.regex_cache.url_regex.get_or_init(|| {
            Regex::new(r"^(www\.)?[a-zA-Z0-9-]+(\.[a-zA-Z0-9-]+)+(/[^\s]*)?$").unwrap()
        });
        text.starts_with("www.") && url_regex.is_match(text)
    }

    /// 邮箱检查
    fn is_email(&self, text: &str) -> bool {
        if text.len() > 100 || !text.contains('@') || !text.contains('.') {
            return false;
        }

        let email_regex = self.regex_cache.email_regex.get_or_init(|| {
            Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap()
        });
        email_regex.is_match(text)
    }

    /// 注释标记前缀
    fn has_comment_marker(text: &str) -> bool {
        text.starts_with("//")
            || text.starts_with("/*")
            || text.starts_with("<!--")
            || text.starts_with("#!")
    }

    /// 整体被括号包裹且不含字母
    fn is_bracket_only(text: &str) -> bool {
        let enclosed = (text.starts_with('[') && text.ends_with(']'))
            || (text.starts_with('(') && text.ends_with(')'))
            || (text.starts_with('{') && text.ends_with('}'));

        enclosed && !text[1..text.len() - 1].contains(char::is_alphabetic)
    }

    /// UUID、长十六进制散列或版本号等机器标识
    fn is_machine_token(&self, text: &str) -> bool {
        let uuid_regex = self.regex_cache.uuid_regex.get_or_init(|| {
            Regex::new(
                r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$",
            )
            .unwrap()
        });
        if uuid_regex.is_match(text) {
            return true;
        }

        let hex_regex = self
            .regex_cache
            .hex_token_regex
            .get_or_init(|| Regex::new(r"^(0x)?[0-9a-fA-F]{16,}$").unwrap());
        if hex_regex.is_match(text) {
            return true;
        }

        let version_regex = self
            .regex_cache
            .version_regex
            .get_or_init(|| Regex::new(r"^[vV]?\d+(\.\d+)+([.-][0-9a-zA-Z]+)*$").unwrap());
        version_regex.is_match(text)
    }
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self::new(false)
    }
}
