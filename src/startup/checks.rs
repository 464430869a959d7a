use std::fs;

use crate::config::AppConfig;
use crate::error::AppError;

/// 执行启动检查
///
/// 1. 检查并创建 resources 文件夹
/// 2. 检查 SVG 模板是否存在（缺失则启动失败）
/// 3. 检查字体资源（仅告警，不阻断启动）
pub fn run_startup_checks(config: &AppConfig) -> Result<(), AppError> {
    tracing::info!("开始执行启动检查...");

    ensure_resources_folder(config)?;
    ensure_value_template(config)?;
    warn_on_missing_fonts(config);

    tracing::info!("启动检查完成");
    Ok(())
}

/// 确保 resources 文件夹存在
fn ensure_resources_folder(config: &AppConfig) -> Result<(), AppError> {
    let resources_path = config.resources_path();

    if !resources_path.exists() {
        tracing::warn!("未找到 resources 文件夹，正在创建: {:?}", resources_path);
        fs::create_dir_all(&resources_path)
            .map_err(|e| AppError::Internal(format!("创建 resources 文件夹失败: {e}")))?;
    }

    Ok(())
}

/// 取值卡片模板是渲染的硬依赖，缺失时立即失败而不是等首个图片请求 500。
fn ensure_value_template(config: &AppConfig) -> Result<(), AppError> {
    let template = config.templates_path().join("image").join("value.svg.jinja");
    if !template.is_file() {
        return Err(AppError::Internal(format!(
            "SVG 模板缺失: {}",
            template.display()
        )));
    }
    tracing::info!("SVG 模板就绪: {}", template.display());
    Ok(())
}

/// 字体目录为空时 PNG/JPEG 中的文字可能渲染为空白。
/// 开启 load_system_fonts 时可由系统字体兜底，因此只告警。
fn warn_on_missing_fonts(config: &AppConfig) {
    let fonts_path = config.fonts_path();
    let has_fonts = fs::read_dir(&fonts_path)
        .map(|entries| {
            entries.flatten().any(|e| {
                let p = e.path();
                p.extension() == Some("ttf".as_ref()) || p.extension() == Some("otf".as_ref())
            })
        })
        .unwrap_or(false);

    if !has_fonts {
        if config.image.load_system_fonts {
            tracing::warn!(
                "字体目录 {:?} 为空，将回退使用系统字体",
                fonts_path
            );
        } else {
            tracing::warn!(
                "字体目录 {:?} 为空且未启用系统字体回退，图片中的文字可能无法渲染",
                fonts_path
            );
        }
    }
}
