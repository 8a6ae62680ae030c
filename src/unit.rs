//! 内容单元
//!
//! 扫描阶段发现的单个可翻译内容：文本节点或元素属性

use std::time::Instant;

use markup5ever_rcdom::Handle;

use crate::config::constants;
use crate::dom::{get_node_attr, get_node_name};

/// 内容单元类型
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitKind {
    /// 元素下的文本内容
    Text,
    /// 元素属性，携带属性名
    Attribute(String),
}

impl UnitKind {
    pub fn attr_name(&self) -> Option<&str> {
        match self {
            UnitKind::Attribute(name) => Some(name),
            UnitKind::Text => None,
        }
    }
}

/// 单个可翻译内容单元
///
/// 持有元素的非拥有引用，仅在当前扫描轮次内有效；
/// 元素可能在翻译返回前被宿主页面替换或移除，写回前必须重新校验。
#[derive(Debug, Clone)]
pub struct ContentUnit {
    /// 稳定标识：标签 + class + id + 属性名 + 内容哈希
    pub id: String,
    /// 目标元素句柄（属性单元为属性所在元素，文本单元为包含文本的元素）
    pub element: Handle,
    pub kind: UnitKind,
    /// 原始文本，已 trim
    pub original_text: String,
    /// 语义上下文描述
    pub context: String,
    /// 优先级 0-200，越高越先处理
    pub priority: u16,
    /// 扫描时刻的视口可见性快照
    pub visible: bool,
    /// 失败重试计数；超过上限后从队列丢弃
    pub retry_count: u8,
    pub last_updated: Instant,
}

impl ContentUnit {
    pub fn new(
        element: Handle,
        kind: UnitKind,
        original_text: String,
        context: String,
        priority: u16,
        visible: bool,
    ) -> Self {
        let id = derive_unit_id(&element, &kind, &original_text);

        Self {
            id,
            element,
            kind,
            original_text,
            context,
            priority,
            visible,
            retry_count: 0,
            last_updated: Instant::now(),
        }
    }

    /// 记录一次失败
    pub fn record_failure(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_updated = Instant::now();
    }

    /// 是否已超出重试上限
    pub fn exhausted(&self) -> bool {
        self.retry_count > constants::MAX_UNIT_RETRIES
    }

    pub fn char_count(&self) -> usize {
        self.original_text.chars().count()
    }
}

/// 派生内容单元的稳定标识
fn derive_unit_id(element: &Handle, kind: &UnitKind, text: &str) -> String {
    let mut hasher = blake3::Hasher::new();

    hasher.update(get_node_name(element).unwrap_or("").as_bytes());
    hasher.update(b"\x1f");
    hasher.update(
        get_node_attr(element, "class")
            .unwrap_or_default()
            .as_bytes(),
    );
    hasher.update(b"\x1f");
    hasher.update(get_node_attr(element, "id").unwrap_or_default().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(kind.attr_name().unwrap_or("#text").as_bytes());
    hasher.update(b"\x1f");
    hasher.update(text.as_bytes());

    hasher.finalize().to_hex()[..16].to_string()
}
