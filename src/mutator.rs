//! DOM 写入器
//!
//! 把译文写回元素或属性：写前校验、多级匹配策略、标记属性幂等，
//! 并登记原始内容以支持回到源语言时的逐字节还原

use std::cell::RefCell;

use markup5ever_rcdom::Handle;

use crate::config::constants;
use crate::dom::{
    collect_text_nodes, element_text, get_node_attr, set_node_attr, set_text_content, text_content,
};
use crate::unit::{ContentUnit, UnitKind};

/// 一次还原操作
enum Restore {
    Text { node: Handle, original: String },
    Attribute {
        element: Handle,
        name: String,
        original: String,
    },
}

/// 一次成功写入的登记记录
struct Applied {
    element: Handle,
    restores: Vec<Restore>,
}

/// DOM 写入器
#[derive(Default)]
pub struct DomMutator {
    applied: RefCell<Vec<Applied>>,
}

impl DomMutator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 应用一条译文
    ///
    /// 幂等：元素已带标记且当前内容与译文一致时直接视为成功。
    /// 失败只记日志并返回 false，绝不中断批次。
    pub fn apply(&self, unit: &ContentUnit, translated: &str) -> bool {
        let translated = translated.trim();
        if translated.is_empty() || translated == unit.original_text {
            tracing::debug!("译文为空或与原文相同，跳过: {}", unit.id);
            return false;
        }

        match &unit.kind {
            UnitKind::Attribute(name) => self.apply_attribute(unit, name, translated),
            UnitKind::Text => self.apply_text(unit, translated),
        }
    }

    /// 已登记写入的元素数
    pub fn applied_count(&self) -> usize {
        self.applied.borrow().len()
    }

    /// 还原所有已写入内容并清除标记，返回还原的元素数
    pub fn restore_all(&self) -> usize {
        let records: Vec<Applied> = self.applied.borrow_mut().drain(..).collect();
        let count = records.len();

        for record in records.into_iter().rev() {
            for restore in record.restores.into_iter().rev() {
                match restore {
                    Restore::Text { node, original } => set_text_content(&node, &original),
                    Restore::Attribute {
                        element,
                        name,
                        original,
                    } => set_node_attr(&element, &name, Some(original)),
                }
            }
            set_node_attr(&record.element, constants::MARKER_ATTR, None);
        }

        if count > 0 {
            tracing::info!("已还原 {} 个元素", count);
        }
        count
    }

    fn apply_attribute(&self, unit: &ContentUnit, attr_name: &str, translated: &str) -> bool {
        let current = match get_node_attr(&unit.element, attr_name) {
            Some(current) => current,
            None => {
                tracing::debug!("属性已不存在，跳过: {} {}", unit.id, attr_name);
                return false;
            }
        };

        // 幂等检查
        if current.trim() == translated {
            self.ensure_marker(&unit.element);
            return true;
        }

        // 写前校验：属性值仍须等于扫描时的原文，防止并发变更后误写
        if current.trim() != unit.original_text {
            tracing::debug!("属性值已变化，放弃写入: {}", unit.id);
            return false;
        }

        set_node_attr(&unit.element, attr_name, Some(translated.to_string()));
        self.record(
            &unit.element,
            vec![Restore::Attribute {
                element: unit.element.clone(),
                name: attr_name.to_string(),
                original: current,
            }],
        );
        true
    }

    fn apply_text(&self, unit: &ContentUnit, translated: &str) -> bool {
        let element = &unit.element;

        // 幂等检查：已带标记且译文已在其中
        if get_node_attr(element, constants::MARKER_ATTR).is_some()
            && element_text(element).contains(translated)
        {
            return true;
        }

        let text_nodes = collect_text_nodes(element);
        let non_empty: Vec<Handle> = text_nodes
            .iter()
            .filter(|n| {
                text_content(n)
                    .map(|t| !t.trim().is_empty())
                    .unwrap_or(false)
            })
            .cloned()
            .collect();

        if non_empty.is_empty() {
            tracing::debug!("元素已无文本内容，跳过: {}", unit.id);
            return false;
        }

        let original = unit.original_text.as_str();

        // (a) 整体精确匹配：元素文本与原文一致
        if element_text(element).trim() == original {
            if non_empty.len() == 1 {
                let restore = self.overwrite(&non_empty[0], translated);
                self.record(element, vec![restore]);
                return true;
            }
            // (c) 原文被行内标记拆分：首节点承载译文，其余清空
            let restores = self.redistribute(&non_empty, translated);
            self.record(element, restores);
            return true;
        }

        // (b) 子串匹配：某个文本节点包含完整原文，保留前后文本
        for node in &non_empty {
            let content = text_content(node).unwrap_or_default();
            if content.contains(original) {
                let replaced = content.replacen(original, translated, 1);
                set_text_content(node, &replaced);
                self.record(
                    element,
                    vec![Restore::Text {
                        node: node.clone(),
                        original: content,
                    }],
                );
                return true;
            }
        }

        // (c) 空白差异下的整体匹配（原文跨越多个文本节点）
        if collapse_ws(&element_text(element)) == collapse_ws(original) && non_empty.len() > 1 {
            let restores = self.redistribute(&non_empty, translated);
            self.record(element, restores);
            return true;
        }

        // (d) 深度遍历：单个文本节点在空白归一后与原文一致
        for node in &non_empty {
            let content = text_content(node).unwrap_or_default();
            if collapse_ws(content.trim()) == collapse_ws(original) {
                let restore = self.overwrite(node, translated);
                self.record(element, vec![restore]);
                return true;
            }
        }

        // (e) 兜底：唯一的非空文本节点直接覆写
        if non_empty.len() == 1 {
            let restore = self.overwrite(&non_empty[0], translated);
            self.record(element, vec![restore]);
            return true;
        }

        tracing::debug!("所有写入策略均未命中: {}", unit.id);
        false
    }

    fn overwrite(&self, node: &Handle, translated: &str) -> Restore {
        let original = text_content(node).unwrap_or_default();
        set_text_content(node, translated);
        Restore::Text {
            node: node.clone(),
            original,
        }
    }

    fn redistribute(&self, nodes: &[Handle], translated: &str) -> Vec<Restore> {
        let mut restores = Vec::with_capacity(nodes.len());

        for (i, node) in nodes.iter().enumerate() {
            let original = text_content(node).unwrap_or_default();
            if i == 0 {
                set_text_content(node, translated);
            } else {
                set_text_content(node, "");
            }
            restores.push(Restore::Text {
                node: node.clone(),
                original,
            });
        }

        restores
    }

    fn record(&self, element: &Handle, restores: Vec<Restore>) {
        set_node_attr(element, constants::MARKER_ATTR, Some("1".to_string()));
        self.applied.borrow_mut().push(Applied {
            element: element.clone(),
            restores,
        });
    }

    fn ensure_marker(&self, element: &Handle) {
        if get_node_attr(element, constants::MARKER_ATTR).is_none() {
            set_node_attr(element, constants::MARKER_ATTR, Some("1".to_string()));
        }
    }
}

/// 空白归一化
fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
