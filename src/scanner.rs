//! 内容扫描器
//!
//! 遍历文档树，结合排除策略与上下文分析产出按优先级排序的内容单元队列

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use crate::config::constants;
use crate::context::{ContextAnalyzer, ContextReport};
use crate::dom::{get_node_attr, get_node_name};
use crate::error::EngineResult;
use crate::exclusion::ExclusionPolicy;
use crate::unit::{ContentUnit, UnitKind};
use crate::viewport::GeometryProvider;

/// 扫描选项
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// 绕过可见性排除
    pub include_hidden: bool,
    /// 可见单元排在隐藏单元之前
    pub prioritize_visible: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            include_hidden: false,
            prioritize_visible: true,
        }
    }
}

/// 标签优先级表（标题最高，递减到通用容器）
const TAG_PRIORITIES: &[(&str, i32)] = &[
    ("h1", 30),
    ("h2", 26),
    ("h3", 22),
    ("h4", 18),
    ("h5", 15),
    ("h6", 12),
    ("button", 10),
    ("a", 8),
    ("label", 6),
    ("li", 5),
    ("td", 4),
    ("th", 4),
    ("p", 3),
    ("span", 1),
    ("div", 0),
];

/// 内容扫描器
pub struct ContentScanner {
    options: ScanOptions,
    exclusion: ExclusionPolicy,
    analyzer: ContextAnalyzer,
}

impl ContentScanner {
    pub fn new(options: ScanOptions, geometry: Option<Rc<dyn GeometryProvider>>) -> Self {
        let exclusion = ExclusionPolicy::new(options.include_hidden);
        let analyzer = ContextAnalyzer::new(geometry);

        Self {
            options,
            exclusion,
            analyzer,
        }
    }

    /// 扫描子树，返回排序后的内容单元
    ///
    /// 单个节点的上下文或几何解析失败只影响该节点（退回默认值），不中断扫描。
    pub fn scan(&self, root: &Handle) -> EngineResult<Vec<ContentUnit>> {
        let mut units: Vec<ContentUnit> = Vec::new();
        let mut claimed: HashSet<(usize, String)> = HashSet::new();

        self.visit(root, &mut units, &mut claimed);

        // 相同 id 的单元折叠为一个，保留高优先级者
        let mut by_id: HashMap<String, ContentUnit> = HashMap::new();
        for unit in units {
            match by_id.get(&unit.id) {
                Some(existing) if existing.priority >= unit.priority => {}
                _ => {
                    by_id.insert(unit.id.clone(), unit);
                }
            }
        }

        let mut result: Vec<ContentUnit> = by_id.into_values().collect();

        if self.options.prioritize_visible {
            result.sort_by(|a, b| {
                b.visible
                    .cmp(&a.visible)
                    .then_with(|| b.priority.cmp(&a.priority))
            });
        } else {
            result.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        tracing::debug!("扫描完成: {} 个内容单元", result.len());
        Ok(result)
    }

    fn visit(
        &self,
        node: &Handle,
        units: &mut Vec<ContentUnit>,
        claimed: &mut HashSet<(usize, String)>,
    ) {
        if let NodeData::Element { .. } = node.data {
            if self.exclusion.is_excluded_element(node) {
                return;
            }

            // 已翻译的元素整体跳过，避免把译文再次入队
            if get_node_attr(node, constants::MARKER_ATTR).is_some() {
                return;
            }

            let key = Rc::as_ptr(node) as usize;
            let report = self.analyzer.analyze(node);

            // 可翻译属性
            for attr_name in constants::TRANSLATABLE_ATTRS {
                if let Some(value) = get_node_attr(node, attr_name) {
                    let trimmed = value.trim();
                    if trimmed.is_empty() || self.exclusion.is_excluded_text(trimmed) {
                        continue;
                    }
                    if !claimed.insert((key, attr_name.to_string())) {
                        continue;
                    }

                    units.push(self.build_unit(
                        node,
                        UnitKind::Attribute(attr_name.to_string()),
                        trimmed.to_string(),
                        &report,
                    ));
                }
            }

            // 直接子文本节点
            for child in node.children.borrow().iter() {
                if let NodeData::Text { contents } = &child.data {
                    let text = contents.borrow();
                    let trimmed = text.trim();
                    if trimmed.is_empty() || self.exclusion.is_excluded_text(trimmed) {
                        continue;
                    }
                    if !claimed.insert((key, format!("#text:{}", trimmed))) {
                        continue;
                    }

                    units.push(self.build_unit(
                        node,
                        UnitKind::Text,
                        trimmed.to_string(),
                        &report,
                    ));
                }
            }
        }

        for child in node.children.borrow().iter() {
            if matches!(child.data, NodeData::Element { .. }) {
                self.visit(child, units, claimed);
            }
        }
    }

    fn build_unit(
        &self,
        element: &Handle,
        kind: UnitKind,
        text: String,
        report: &ContextReport,
    ) -> ContentUnit {
        let priority = score(
            get_node_name(element).unwrap_or(""),
            report,
            &text,
        );

        ContentUnit::new(
            element.clone(),
            kind,
            text,
            report.description.clone(),
            priority,
            report.visible,
        )
    }
}

/// 优先级评分
///
/// 基准 50 分，叠加标签权重、视口位置、上下文加成与长度惩罚，截断到 [0, 200]
fn score(tag: &str, report: &ContextReport, text: &str) -> u16 {
    let mut score = constants::BASE_PRIORITY;

    score += TAG_PRIORITIES
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|&(_, p)| p)
        .unwrap_or(2);

    if report.visible {
        score += 30;
        if report.upper_half {
            score += 20;
        }
    }

    let context = report.description.as_str();
    if context.contains("navigation") {
        score += 25;
    }
    if context.contains("button") {
        score += 20;
    }
    if context.contains("heading") {
        score += 15;
    }
    if context.contains("hero") {
        score += if report.visible { 40 } else { 30 };
    }
    if context.contains("cta") {
        score += if report.visible { 30 } else { 25 };
    }

    let chars = text.chars().count();
    if chars > 100 {
        score -= 10;
    }
    if chars > 200 {
        score -= 15;
    }

    score.clamp(0, constants::MAX_PRIORITY) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::html_to_dom;

    fn scan(html: &str) -> Vec<ContentUnit> {
        let dom = html_to_dom(html.as_bytes(), "utf-8");
        let scanner = ContentScanner::new(ScanOptions::default(), None);
        scanner.scan(&dom.document).expect("scan must not fail")
    }

    #[test]
    fn test_example_page_yields_single_unit() {
        let units = scan(
            "<html><body>\
             <h1>Welcome</h1>\
             <p>https://example.com</p>\
             <button data-no-translate>Skip</button>\
             </body></html>",
        );

        assert_eq!(units.len(), 1, "URL and opted-out button are excluded");
        assert_eq!(units[0].original_text, "Welcome");
        assert_eq!(units[0].kind, UnitKind::Text);
    }

    #[test]
    fn test_h1_outranks_div() {
        let units = scan("<html><body><div>Some plain words</div><h1>Some plain words here</h1></body></html>");

        assert_eq!(units.len(), 2);
        let h1 = units
            .iter()
            .find(|u| u.context.contains("heading"))
            .expect("h1 unit present");
        let div = units
            .iter()
            .find(|u| !u.context.contains("heading"))
            .expect("div unit present");
        assert!(h1.priority > div.priority, "h1 must strictly outrank div");
        assert_eq!(units[0].id, h1.id, "Sorted output leads with the heading");
    }

    #[test]
    fn test_attribute_units() {
        let units = scan(
            "<html><body><img src='cat.png' alt='A sleeping cat' title='Cat photo'></body></html>",
        );

        assert_eq!(units.len(), 2);
        assert!(units
            .iter()
            .all(|u| matches!(u.kind, UnitKind::Attribute(_))));
        let names: Vec<_> = units
            .iter()
            .filter_map(|u| u.kind.attr_name().map(str::to_string))
            .collect();
        assert!(names.contains(&"alt".to_string()));
        assert!(names.contains(&"title".to_string()));
    }

    #[test]
    fn test_numeric_and_short_content_never_emitted() {
        let units = scan(
            "<html><body><p>12345</p><p>x</p><p>user@example.com</p><span>!!</span></body></html>",
        );
        assert!(units.is_empty(), "Excluded patterns must not produce units: {:?}",
            units.iter().map(|u| u.original_text.clone()).collect::<Vec<_>>());
    }

    #[test]
    fn test_marked_elements_are_skipped() {
        let html = format!(
            "<html><body><h1 {}='1'>Bienvenue</h1><p>Fresh content</p></body></html>",
            constants::MARKER_ATTR
        );
        let units = scan(&html);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].original_text, "Fresh content");
    }

    #[test]
    fn test_length_penalty() {
        let short = "Readable sentence";
        let long = "word ".repeat(50); // ~250 chars
        let html = format!("<html><body><p>{}</p><p>{}</p></body></html>", short, long);
        let units = scan(&html);

        let short_unit = units.iter().find(|u| u.original_text == short).unwrap();
        let long_unit = units.iter().find(|u| u.original_text != short).unwrap();
        assert!(short_unit.priority > long_unit.priority, "Long text is penalized");
    }

    #[test]
    fn test_duplicate_text_collapses() {
        // 同一元素内重复的相同文本只产生一个单元
        let units = scan("<html><body><p>Repeat me<b>!!</b>Repeat me</p></body></html>");
        assert_eq!(units.len(), 1);
    }
}
