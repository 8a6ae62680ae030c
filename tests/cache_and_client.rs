//! 缓存与翻译客户端的端到端测试
//!
//! 验证缓存消除重复网络调用、持久化存储跨引擎实例复用、
//! 以及恒等译文不污染缓存

mod common;

use std::rc::Rc;

use autolingua::dom::element_text;
use autolingua::{AdminAccess, EngineController};

use common::*;

#[tokio::test]
async fn test_cache_eliminates_repeat_network_calls() {
    let dom = parse_html("<html><body><h1>Welcome</h1><p>Good morning</p></body></html>");
    let backend =
        MockBackend::with_pairs(&[("Welcome", "Bienvenue"), ("Good morning", "Bonjour")]);
    let engine =
        EngineController::new(dom.document.clone(), test_config(), backend.clone()).unwrap();

    engine.set_language("fr").await;
    assert_eq!(backend.calls(), 2);

    // 还原后重新激活同一语言：全部命中缓存
    engine.set_language("en").await;
    engine.set_language("fr").await;

    assert_eq!(backend.calls(), 2, "Re-activation resolves entirely from cache");
    let h1 = find_first(&dom.document, "h1");
    assert_eq!(element_text(&h1).trim(), "Bienvenue");

    println!("✅ Cache eliminates repeat network calls");
}

#[tokio::test]
async fn test_persistent_store_shared_across_engines() {
    const PAGE: &str = "<html><body><h1>Welcome</h1></body></html>";
    let (config, path) = test_config_with_store("shared");
    let _ = std::fs::remove_file(&path);

    {
        let dom = parse_html(PAGE);
        let backend = MockBackend::with_pairs(&[("Welcome", "Bienvenue")]);
        let engine =
            EngineController::new(dom.document.clone(), config.clone(), backend.clone()).unwrap();
        engine.set_language("fr").await;
        assert_eq!(backend.calls(), 1);
    }

    // 新引擎实例 + 永远失败的后端：译文只能来自持久化存储
    let dom = parse_html(PAGE);
    let backend = MockBackend::failing();
    let engine =
        EngineController::new(dom.document.clone(), config, backend.clone()).unwrap();
    engine.set_language("fr").await;

    let h1 = find_first(&dom.document, "h1");
    assert_eq!(element_text(&h1).trim(), "Bienvenue", "Store entry served the translation");
    assert_eq!(backend.calls(), 0, "No network traffic on a warm store");

    let _ = std::fs::remove_file(&path);
    println!("✅ Persistent store shared across engine instances");
}

#[tokio::test]
async fn test_identity_response_does_not_poison_cache() {
    let dom = parse_html("<html><body><p>Echo chamber</p></body></html>");
    // 服务原样返回输入：视为失败，不得写入缓存
    let backend = MockBackend::with_pairs(&[("Echo chamber", "Echo chamber")]);
    let engine =
        EngineController::new(dom.document.clone(), test_config(), backend.clone()).unwrap();

    engine.set_language("fr").await;
    let p = find_first(&dom.document, "p");
    assert_eq!(element_text(&p).trim(), "Echo chamber", "Original text stays in place");
    assert_eq!(backend.calls(), 6, "Three retry cycles of two attempts each, then drop");

    // 服务修复后重新激活：没有被污染的缓存挡路
    backend.insert("Echo chamber", "Chambre d'écho");
    engine.set_language("en").await;
    engine.set_language("fr").await;

    assert_eq!(element_text(&p).trim(), "Chambre d'écho");
    assert_eq!(backend.calls(), 7, "The fixed service is consulted, not a stale cache entry");

    println!("✅ Identity responses never poison the cache");
}

#[tokio::test]
async fn test_cache_diagnostics_reflect_traffic() {
    let dom = parse_html("<html><body><h1>Welcome</h1><p>Good morning</p></body></html>");
    let backend =
        MockBackend::with_pairs(&[("Welcome", "Bienvenue"), ("Good morning", "Bonjour")]);
    let engine = EngineController::with_collaborators(
        dom.document.clone(),
        test_config(),
        backend,
        None,
        Rc::new(AdminAccess),
    )
    .unwrap();

    engine.set_language("fr").await;
    engine.set_language("en").await;
    engine.set_language("fr").await;

    let report = engine.diagnostics().expect("admin sees diagnostics");
    assert_eq!(report.cache.insertions, 2);
    assert!(report.cache.hits >= 2, "Second pass produced cache hits");
    assert!(report.cache.hit_rate > 0.0);

    println!("✅ Cache diagnostics reflect real traffic");
}
