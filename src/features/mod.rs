/// 健康检查
pub mod health;

/// 图像渲染
pub mod image;

/// 随机值流水线
pub mod random;
