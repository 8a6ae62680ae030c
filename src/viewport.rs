//! 视口几何
//!
//! 元素位置信息的外部协作者接口；宿主没有布局引擎时提供文档流估算实现

use std::collections::HashMap;
use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

/// 矩形区域（CSS 像素）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// 与另一矩形是否相交
    pub fn intersects(&self, other: &Rect) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// 几何信息提供者
///
/// `element_rect` 返回 None 表示元素已脱离文档或无法测量，
/// 调用方只省略位置上下文，不视为错误。
pub trait GeometryProvider {
    /// 当前视口
    fn viewport(&self) -> Rect;

    /// 元素的包围盒
    fn element_rect(&self, element: &Handle) -> Option<Rect>;
}

/// 文档流估算几何
///
/// 无布局引擎时按文档顺序估算纵向位置：每个元素占一行
pub struct DocumentFlowGeometry {
    root: Handle,
    viewport: Rect,
    line_height: f64,
}

impl DocumentFlowGeometry {
    pub fn new(root: Handle) -> Self {
        Self {
            root,
            viewport: Rect::new(0.0, 0.0, 1280.0, 800.0),
            line_height: 24.0,
        }
    }

    pub fn with_viewport(mut self, viewport: Rect) -> Self {
        self.viewport = viewport;
        self
    }

    fn document_index(&self, target: &Handle) -> Option<usize> {
        let mut index = 0;
        Self::find_index(&self.root, target, &mut index)
    }

    fn find_index(node: &Handle, target: &Handle, index: &mut usize) -> Option<usize> {
        if let NodeData::Element { .. } = node.data {
            if Rc::ptr_eq(node, target) {
                return Some(*index);
            }
            *index += 1;
        }

        for child in node.children.borrow().iter() {
            if let Some(found) = Self::find_index(child, target, index) {
                return Some(found);
            }
        }

        None
    }
}

impl GeometryProvider for DocumentFlowGeometry {
    fn viewport(&self) -> Rect {
        self.viewport
    }

    fn element_rect(&self, element: &Handle) -> Option<Rect> {
        let index = self.document_index(element)?;
        let y = index as f64 * self.line_height;
        Some(Rect::new(0.0, y, self.viewport.width, self.line_height))
    }
}

/// 固定几何表（测试与宿主注入用）
#[derive(Default)]
pub struct FixedGeometry {
    viewport: Option<Rect>,
    rects: HashMap<usize, Rect>,
}

impl FixedGeometry {
    pub fn new(viewport: Rect) -> Self {
        Self {
            viewport: Some(viewport),
            rects: HashMap::new(),
        }
    }

    pub fn set_rect(&mut self, element: &Handle, rect: Rect) {
        self.rects.insert(Rc::as_ptr(element) as usize, rect);
    }
}

impl GeometryProvider for FixedGeometry {
    fn viewport(&self) -> Rect {
        self.viewport.unwrap_or(Rect::new(0.0, 0.0, 1280.0, 800.0))
    }

    fn element_rect(&self, element: &Handle) -> Option<Rect> {
        self.rects.get(&(Rc::as_ptr(element) as usize)).copied()
    }
}
