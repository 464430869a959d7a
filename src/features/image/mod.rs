//! 图像渲染：SVG 模板绑定与 PNG/JPEG 转换。

pub mod renderer;
