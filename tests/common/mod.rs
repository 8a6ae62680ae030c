//! 集成测试公共辅助设施

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use markup5ever_rcdom::{Handle, RcDom};

use autolingua::dom::{find_nodes, html_to_dom};
use autolingua::error::{EngineError, EngineResult};
use autolingua::{EngineConfig, TranslateRequest, TranslateResponse, TranslationBackend};

/// 词典式模拟翻译后端，记录调用次数，可切换为全失败模式
pub struct MockBackend {
    map: RefCell<HashMap<String, String>>,
    calls: Cell<usize>,
    fail_all: Cell<bool>,
    latency_ms: Cell<u64>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            map: RefCell::new(HashMap::new()),
            calls: Cell::new(0),
            fail_all: Cell::new(false),
            latency_ms: Cell::new(0),
        }
    }

    pub fn with_pairs(pairs: &[(&str, &str)]) -> Rc<Self> {
        let backend = Self::new();
        for &(original, translated) in pairs {
            backend
                .map
                .borrow_mut()
                .insert(original.to_string(), translated.to_string());
        }
        Rc::new(backend)
    }

    /// 永远失败的后端
    pub fn failing() -> Rc<Self> {
        let backend = Self::new();
        backend.fail_all.set(true);
        Rc::new(backend)
    }

    pub fn insert(&self, original: &str, translated: &str) {
        self.map
            .borrow_mut()
            .insert(original.to_string(), translated.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.set(fail);
    }

    /// 模拟服务响应延迟
    pub fn set_latency_ms(&self, ms: u64) {
        self.latency_ms.set(ms);
    }
}

#[async_trait(?Send)]
impl TranslationBackend for MockBackend {
    async fn translate(&self, request: &TranslateRequest) -> EngineResult<TranslateResponse> {
        self.calls.set(self.calls.get() + 1);

        let latency = self.latency_ms.get();
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.fail_all.get() {
            return Err(EngineError::Network("mock backend down".to_string()));
        }

        match self.map.borrow().get(&request.text) {
            Some(translated) => Ok(TranslateResponse {
                translated_text: translated.clone(),
                quality: Some(0.9),
            }),
            None => Err(EngineError::InvalidResponse(format!(
                "no mapping for '{}'",
                request.text
            ))),
        }
    }
}

/// 初始化测试日志（重复调用安全）
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// 解析 HTML 字符串
pub fn parse_html(html: &str) -> RcDom {
    html_to_dom(html.as_bytes(), "utf-8")
}

/// 查找第一个指定标签的元素
pub fn find_first(root: &Handle, tag: &str) -> Handle {
    let mut nodes = find_nodes(root, tag);
    assert!(!nodes.is_empty(), "expected at least one <{}> element", tag);
    nodes.remove(0)
}

/// 把另一段 HTML 中的元素接入目标父元素（模拟宿主动态插入内容）
pub fn append_element(parent: &Handle, html: &str, tag: &str) -> Handle {
    let fragment = parse_html(html);
    let node = find_first(&fragment.document, tag);

    // 先从片段树上摘除，否则片段释放时会顺带清空该节点的子树
    if let Some(old_parent) = node.parent.take().as_ref().and_then(|weak| weak.upgrade()) {
        old_parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, &node));
    }

    node.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(node.clone());
    node
}

/// 测试配置：去掉所有人为延迟，保证测试快速且确定
pub fn test_config() -> EngineConfig {
    EngineConfig {
        source_lang: "en".to_string(),
        batch_size: 5,
        intra_batch_stagger_ms: 0,
        inter_batch_delay_ms: 0,
        debounce_ms: 10,
        self_write_guard_ms: 0,
        retry_delay_ms: 1,
        call_timeout_secs: 2,
        cache_path: None,
        ..EngineConfig::default()
    }
}

/// 带持久化路径的测试配置
pub fn test_config_with_store(name: &str) -> (EngineConfig, std::path::PathBuf) {
    let path = std::env::temp_dir().join(format!(
        "autolingua-test-{}-{}.json",
        name,
        std::process::id()
    ));
    let mut config = test_config();
    config.cache_path = Some(path.to_string_lossy().to_string());
    (config, path)
}
