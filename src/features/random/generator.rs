//! 随机值生成。
//!
//! 三个操作都建立在同一个均匀随机源上：区间整数、按下标取元素、
//! 无偏洗牌。洗牌使用 Fisher-Yates（rand 的 `SliceRandom::shuffle`），
//! 取代随机比较器排序，后者的分布存在已知偏差。

use rand::Rng;
use rand::seq::SliceRandom;

use crate::error::AppError;

/// 返回 `[min, max]` 闭区间内的均匀整数，`min > max` 时报 `InvalidRange`。
pub fn generate_number(min: i64, max: i64) -> Result<i64, AppError> {
    if min > max {
        return Err(AppError::InvalidRange { min, max });
    }
    Ok(rand::thread_rng().gen_range(min..=max))
}

/// 从非空列表中按下标均匀取一个元素。
pub fn pick_item(items: &[String]) -> Result<String, AppError> {
    if items.is_empty() {
        return Err(AppError::InvalidParameter(
            "Query parameter items must not be empty".to_string(),
        ));
    }
    let index = generate_number(0, items.len() as i64 - 1)?;
    Ok(items[index as usize].clone())
}

/// 返回输入元素的一个均匀随机排列（不修改输入）。
pub fn shuffle(items: &[String]) -> Vec<String> {
    let mut shuffled = items.to_vec();
    shuffled.shuffle(&mut rand::thread_rng());
    shuffled
}
