//! DOM 辅助函数
//!
//! 基于 html5ever / markup5ever_rcdom 的文档解析与节点读写原语

use encoding_rs::Encoding;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RcDom {
    let s: String;

    if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
        let (string, _, _) = encoding.decode(data);
        s = string.to_string();
    } else {
        s = String::from_utf8_lossy(data).to_string();
    }

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .unwrap()
}

/// 查找指定名称的所有元素节点
pub fn find_nodes(node: &Handle, node_name: &str) -> Vec<Handle> {
    let mut found_nodes = Vec::new();

    if let NodeData::Element { ref name, .. } = node.data {
        if &*name.local == node_name {
            found_nodes.push(node.clone());
        }
    }

    for child_node in node.children.borrow().iter() {
        found_nodes.append(&mut find_nodes(child_node, node_name));
    }

    found_nodes
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取父节点；已脱离文档的节点返回 None
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let parent = child.parent.take();
    let handle = parent.as_ref().and_then(|weak| weak.upgrade());
    child.parent.set(parent);
    handle
}

/// 设置节点属性；值为 None 时移除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    use html5ever::interface::{Attribute, QualName};
    use html5ever::tendril::format_tendril;
    use html5ever::{namespace_url, ns, LocalName};

    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.clone() {
                    let _ = &attrs_mut[i].value.clear();
                    let _ = &attrs_mut[i].value.push_slice(attr_value.as_str());
                } else {
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value.clone() {
                let name = LocalName::from(attr_name);

                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), name),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 收集元素下所有后代文本节点
pub fn collect_text_nodes(node: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();

    for child in node.children.borrow().iter() {
        match child.data {
            NodeData::Text { .. } => found.push(child.clone()),
            NodeData::Element { .. } => found.append(&mut collect_text_nodes(child)),
            _ => {}
        }
    }

    found
}

/// 获取元素的完整文本内容（后代文本节点拼接）
pub fn element_text(node: &Handle) -> String {
    let mut out = String::new();

    for child in node.children.borrow().iter() {
        match &child.data {
            NodeData::Text { contents } => out.push_str(&contents.borrow()),
            NodeData::Element { .. } => out.push_str(&element_text(child)),
            _ => {}
        }
    }

    out
}

/// 读取文本节点的内容；非文本节点返回 None
pub fn text_content(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 覆写文本节点的内容
pub fn set_text_content(node: &Handle, value: &str) {
    if let NodeData::Text { contents } = &node.data {
        let mut contents = contents.borrow_mut();
        contents.clear();
        contents.push_slice(value);
    }
}

/// 自下而上遍历祖先元素，深度受 max_depth 限制
pub fn ancestors(node: &Handle, max_depth: usize) -> Vec<Handle> {
    let mut chain = Vec::new();
    let mut current = node.clone();

    for _ in 0..max_depth {
        match get_parent_node(&current) {
            Some(parent) => {
                if get_node_name(&parent).is_none() {
                    break;
                }
                chain.push(parent.clone());
                current = parent;
            }
            None => break,
        }
    }

    chain
}
