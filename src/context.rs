//! 上下文分析
//!
//! 从标签语义、class 关键字、视口位置与祖先地标推导元素的语义描述；
//! 结果同时用于翻译质量上下文与优先级评分

use std::rc::Rc;

use markup5ever_rcdom::Handle;

use crate::config::constants;
use crate::dom::{ancestors, get_node_attr, get_node_name};
use crate::viewport::GeometryProvider;

/// 无任何匹配时的固定回退描述
pub const FALLBACK_CONTEXT: &str = "general content";

/// 标签到语义角色的映射表
const TAG_ROLES: &[(&str, &str)] = &[
    ("h1", "main heading"),
    ("h2", "section heading"),
    ("h3", "subsection heading"),
    ("h4", "minor heading"),
    ("h5", "minor heading"),
    ("h6", "minor heading"),
    ("p", "paragraph"),
    ("button", "button"),
    ("a", "link"),
    ("nav", "navigation"),
    ("header", "page header"),
    ("footer", "page footer"),
    ("main", "main content"),
    ("aside", "sidebar"),
    ("article", "article"),
    ("section", "section"),
    ("li", "list item"),
    ("td", "table cell"),
    ("th", "table cell"),
    ("label", "form label"),
    ("input", "form control"),
    ("select", "form control"),
    ("option", "form control"),
    ("blockquote", "quotation"),
    ("figcaption", "caption"),
];

/// class / id 关键字词典
const CLASS_KEYWORDS: &[(&str, &str)] = &[
    ("nav", "navigation"),
    ("menu", "navigation"),
    ("hero", "hero section"),
    ("banner", "hero section"),
    ("card", "card"),
    ("pricing", "pricing"),
    ("testimonial", "testimonial"),
    ("cta", "cta"),
    ("btn", "button"),
    ("button", "button"),
    ("alert", "alert message"),
    ("notice", "alert message"),
    ("badge", "badge"),
    ("footer", "page footer"),
    ("header", "page header"),
    ("title", "heading"),
    ("subtitle", "heading"),
];

/// 作为祖先出现时值得记录的地标标签
const LANDMARK_TAGS: &[(&str, &str)] = &[
    ("nav", "navigation"),
    ("header", "page header"),
    ("footer", "page footer"),
    ("main", "main content"),
    ("aside", "sidebar"),
    ("article", "article"),
    ("section", "section"),
    ("form", "form"),
    ("table", "table"),
    ("ul", "list"),
    ("ol", "list"),
];

/// 上下文分析结果
#[derive(Debug, Clone)]
pub struct ContextReport {
    /// 逗号连接的语义描述
    pub description: String,
    /// 是否与视口相交
    pub visible: bool,
    /// 是否位于视口上半部
    pub upper_half: bool,
}

/// 上下文分析器
pub struct ContextAnalyzer {
    geometry: Option<Rc<dyn GeometryProvider>>,
}

impl ContextAnalyzer {
    pub fn new(geometry: Option<Rc<dyn GeometryProvider>>) -> Self {
        Self { geometry }
    }

    /// 分析元素，返回描述与可见性快照
    pub fn analyze(&self, element: &Handle) -> ContextReport {
        let mut descriptors: Vec<String> = Vec::new();

        // 1. 标签语义角色
        if let Some(tag) = get_node_name(element) {
            if let Some(role) = lookup(TAG_ROLES, tag) {
                push_unique(&mut descriptors, role.to_string());
            }
        }

        // 2. class / id 关键字
        for keyword in Self::class_keywords(element) {
            push_unique(&mut descriptors, keyword.to_string());
        }

        // 3. 祖先地标与关键字（深度受限）
        for ancestor in ancestors(element, constants::MAX_ANCESTOR_DEPTH) {
            if let Some(tag) = get_node_name(&ancestor) {
                if let Some(landmark) = lookup(LANDMARK_TAGS, tag) {
                    push_unique(&mut descriptors, format!("within {}", landmark));
                }
            }
            for keyword in Self::class_keywords(&ancestor) {
                push_unique(&mut descriptors, format!("within {}", keyword));
            }
        }

        // 4. 视口位置（几何查询失败时静默省略位置描述）
        let (visible, upper_half) = self.position(element, &mut descriptors);

        let description = if descriptors.is_empty() {
            FALLBACK_CONTEXT.to_string()
        } else {
            descriptors.join(", ")
        };

        ContextReport {
            description,
            visible,
            upper_half,
        }
    }

    /// 仅返回语义描述
    pub fn describe(&self, element: &Handle) -> String {
        self.analyze(element).description
    }

    /// 元素 class 与 id 命中的关键字
    fn class_keywords(element: &Handle) -> Vec<&'static str> {
        let mut haystack = get_node_attr(element, "class")
            .unwrap_or_default()
            .to_lowercase();
        if let Some(id) = get_node_attr(element, "id") {
            haystack.push(' ');
            haystack.push_str(&id.to_lowercase());
        }

        if haystack.trim().is_empty() {
            return Vec::new();
        }

        CLASS_KEYWORDS
            .iter()
            .filter(|(keyword, _)| haystack.contains(keyword))
            .map(|&(_, descriptor)| descriptor)
            .collect()
    }

    /// 计算可见性并追加位置描述
    fn position(&self, element: &Handle, descriptors: &mut Vec<String>) -> (bool, bool) {
        let geometry = match &self.geometry {
            Some(geometry) => geometry,
            // 无几何信息时默认可见，不追加位置描述
            None => return (true, false),
        };

        let rect = match geometry.element_rect(element) {
            Some(rect) if !rect.is_empty() => rect,
            _ => return (true, false),
        };

        let viewport = geometry.viewport();
        let visible = rect.intersects(&viewport);
        let upper_half = visible && rect.y < viewport.y + viewport.height / 2.0;

        if visible {
            push_unique(descriptors, "above-the-fold content".to_string());
        } else {
            push_unique(descriptors, "below-the-fold content".to_string());
        }

        if rect.width >= viewport.width * 0.9 {
            push_unique(descriptors, "full-width".to_string());
        } else {
            let center = rect.x + rect.width / 2.0;
            if center < viewport.width / 3.0 {
                push_unique(descriptors, "left-aligned".to_string());
            } else if center > viewport.width * 2.0 / 3.0 {
                push_unique(descriptors, "right-aligned".to_string());
            }
        }

        (visible, upper_half)
    }
}

fn lookup(table: &[(&str, &'static str)], key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(tag, _)| *tag == key)
        .map(|&(_, value)| value)
}

fn push_unique(descriptors: &mut Vec<String>, descriptor: String) {
    if !descriptors.contains(&descriptor) {
        descriptors.push(descriptor);
    }
}
