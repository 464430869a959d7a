//! SVG 模板渲染与格式转换。
//!
//! 流程：ImageSpec 绑定进固定的 minijinja SVG 模板，得到向量文档；
//! SVG 输出走最小化（压缩体积，保留文本内容）；PNG/JPEG 输出经
//! resvg 以配置 DPI 栅格化，JPEG 在 PNG 栅格之上再编码一次。
//! 除全局字体库外所有步骤均为输入的纯函数，可安全并发。

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use image::codecs::jpeg::JpegEncoder;
use minijinja::{AutoEscape, Environment, context};
use resvg::usvg::{self, Options as UsvgOptions, fontdb};
use resvg::{
    render,
    tiny_skia::{Color, Pixmap, Transform},
};

use crate::config::AppConfig;
use crate::error::AppError;
use crate::features::random::models::{Format, ImageSpec};

/// 固定模板：带标签的取值卡片
const VALUE_TEMPLATE: &str = "image/value.svg.jinja";

static TEMPLATE_ENV: OnceLock<Environment<'static>> = OnceLock::new();
static GLOBAL_FONT_DB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

fn get_template_env() -> &'static Environment<'static> {
    TEMPLATE_ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_loader(minijinja::path_loader(AppConfig::global().templates_path()));
        // SVG 是 XML，一律走 HTML 转义，防止 items 内容破坏文档结构
        env.set_auto_escape_callback(|_| AutoEscape::Html);
        env
    })
}

/// 初始化全局字体数据库：加载字体目录，按配置回退到系统字体。
fn init_global_font_db() -> Arc<fontdb::Database> {
    let config = AppConfig::global();
    let mut font_db = fontdb::Database::new();

    let fonts_dir: PathBuf = config.fonts_path();
    if fonts_dir.exists() {
        if let Ok(entries) = fs::read_dir(&fonts_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file()
                    && (path.extension() == Some("ttf".as_ref())
                        || path.extension() == Some("otf".as_ref()))
                {
                    if let Err(e) = font_db.load_font_file(&path) {
                        tracing::error!("加载字体文件失败 '{}': {}", path.display(), e);
                    }
                }
            }
        }
    } else {
        tracing::warn!("字体目录不存在: {}", fonts_dir.display());
    }

    if config.image.load_system_fonts {
        font_db.load_system_fonts();
    }
    tracing::info!("字体数据库就绪，共 {} 个字体面", font_db.len());

    Arc::new(font_db)
}

pub fn get_global_font_db() -> Arc<fontdb::Database> {
    GLOBAL_FONT_DB.get_or_init(init_global_font_db).clone()
}

/// 将 ImageSpec 绑定进固定模板，产出向量文档。
pub fn render_value_svg(spec: &ImageSpec) -> Result<String, AppError> {
    let env = get_template_env();
    let tpl = env.get_template(VALUE_TEMPLATE).map_err(|e| {
        AppError::ImageRenderer(format!("加载 SVG 模板失败（{VALUE_TEMPLATE}）: {e}"))
    })?;

    // 字号随卡片高度缩放，上限防止贴边
    let font_size = (spec.height / 4).clamp(12, 160);
    let date_font_size = (font_size / 3).max(10);

    tpl.render(context! {
        value => &spec.value,
        width => spec.width,
        height => spec.height,
        font => spec.font.as_str(),
        font_color => &spec.font_color,
        bg_color => &spec.bg_color,
        show_updated_date => spec.show_updated_date,
        updated_date => &spec.updated_date,
        font_size => font_size,
        date_font_size => date_font_size,
    })
    .map_err(|e| AppError::ImageRenderer(format!("渲染 SVG 模板失败（{VALUE_TEMPLATE}）: {e}")))
}

/// 向量文档体积优化：去掉 XML 注释与标签间的纯空白。
/// 文本节点的非空白内容原样保留，不改变文档语义。
pub fn optimize_svg(svg: &str) -> String {
    let mut out = String::with_capacity(svg.len());
    let mut rest = svg;

    // 先剥离注释
    let mut without_comments = String::with_capacity(svg.len());
    while let Some(start) = rest.find("<!--") {
        without_comments.push_str(&rest[..start]);
        match rest[start..].find("-->") {
            Some(end) => rest = &rest[start + end + 3..],
            None => {
                rest = "";
                break;
            }
        }
    }
    without_comments.push_str(rest);

    // 再压缩标签之间的纯空白段
    let mut pending = String::new();
    let mut in_tag = false;
    for c in without_comments.chars() {
        match c {
            '<' => {
                if !pending.trim().is_empty() {
                    out.push_str(&pending);
                }
                pending.clear();
                in_tag = true;
                out.push(c);
            }
            '>' => {
                in_tag = false;
                out.push(c);
            }
            _ if in_tag => out.push(c),
            _ => pending.push(c),
        }
    }
    if !pending.trim().is_empty() {
        out.push_str(&pending);
    }
    out
}

/// CSS 颜色子集解析（#rgb/#rrggbb/#rrggbbaa 与少量命名色），
/// 用于 JPEG 无透明通道时的底色合成。解析失败回退白底。
fn parse_bg_color(value: &str) -> Color {
    fn hex(byte: &str) -> Option<u8> {
        u8::from_str_radix(byte, 16).ok()
    }

    let v = value.trim();
    if let Some(hexpart) = v.strip_prefix('#') {
        let rgba = match hexpart.len() {
            3 => {
                let expand = |i: usize| hex(&hexpart[i..=i].repeat(2));
                (expand(0), expand(1), expand(2), Some(255))
            }
            6 => (
                hex(&hexpart[0..2]),
                hex(&hexpart[2..4]),
                hex(&hexpart[4..6]),
                Some(255),
            ),
            8 => (
                hex(&hexpart[0..2]),
                hex(&hexpart[2..4]),
                hex(&hexpart[4..6]),
                hex(&hexpart[6..8]),
            ),
            _ => (None, None, None, None),
        };
        if let (Some(r), Some(g), Some(b), Some(a)) = rgba {
            return Color::from_rgba8(r, g, b, a);
        }
    }
    match v {
        "black" => Color::from_rgba8(0, 0, 0, 255),
        "transparent" => Color::TRANSPARENT,
        _ => Color::WHITE,
    }
}

/// SVG 栅格化为 PNG 字节。背景色先铺底，透明模板也能得到实底图。
pub fn svg_to_png(svg_data: &str, bg_color: &str) -> Result<Vec<u8>, AppError> {
    let config = AppConfig::global();
    let speed = config.image.optimize_speed;
    let opts = UsvgOptions {
        fontdb: get_global_font_db(),
        font_family: config.image.default_font_family.clone(),
        dpi: config.image.dpi as f32,
        shape_rendering: if speed {
            usvg::ShapeRendering::OptimizeSpeed
        } else {
            usvg::ShapeRendering::GeometricPrecision
        },
        text_rendering: if speed {
            usvg::TextRendering::OptimizeSpeed
        } else {
            usvg::TextRendering::OptimizeLegibility
        },
        ..Default::default()
    };
    let tree = usvg::Tree::from_data(svg_data.as_bytes(), &opts)
        .map_err(|e| AppError::ImageRenderer(format!("SVG 解析失败: {e}")))?;

    let size = tree.size().to_int_size();
    let mut pixmap = Pixmap::new(size.width(), size.height())
        .ok_or_else(|| AppError::ImageRenderer("创建 Pixmap 失败".to_string()))?;
    pixmap.fill(parse_bg_color(bg_color));

    render(&tree, Transform::default(), &mut pixmap.as_mut());

    // 使用 png crate 直接编码 RGBA 像素
    let mut out = Vec::with_capacity((size.width() * size.height()) as usize);
    {
        let mut encoder = png::Encoder::new(&mut out, size.width(), size.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if speed {
            encoder.set_compression(png::Compression::Fast);
            encoder.set_filter(png::FilterType::NoFilter);
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::ImageRenderer(format!("PNG write_header 失败: {e}")))?;
        writer
            .write_image_data(pixmap.data())
            .map_err(|e| AppError::ImageRenderer(format!("PNG write_image_data 失败: {e}")))?;
    }
    Ok(out)
}

/// PNG 栅格再编码为 JPEG，透明像素向底色合成。
pub fn png_to_jpeg(png_bytes: &[u8], bg_color: &str) -> Result<Vec<u8>, AppError> {
    let quality = AppConfig::global().image.jpeg_quality.clamp(1, 100);
    let img = image::load_from_memory_with_format(png_bytes, image::ImageFormat::Png)
        .map_err(|e| AppError::ImageRenderer(format!("PNG 解码失败: {e}")))?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();

    let bg = parse_bg_color(bg_color);
    let (bg_r, bg_g, bg_b) = (
        (bg.red() * 255.0) as u16,
        (bg.green() * 255.0) as u16,
        (bg.blue() * 255.0) as u16,
    );

    // JPEG 无透明通道，按 alpha 向底色合成
    let mut rgb = Vec::with_capacity((w as usize) * (h as usize) * 3);
    for px in rgba.pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u16;
        rgb.push(((r as u16 * a + bg_r * (255 - a)) / 255) as u8);
        rgb.push(((g as u16 * a + bg_g * (255 - a)) / 255) as u8);
        rgb.push(((b as u16 * a + bg_b * (255 - a)) / 255) as u8);
    }

    let mut out = Vec::new();
    let mut enc = JpegEncoder::new_with_quality(&mut out, quality);
    enc.encode(&rgb, w, h, image::ColorType::Rgb8.into())
        .map_err(|e| AppError::ImageRenderer(format!("JPEG 编码失败: {e}")))?;
    Ok(out)
}

/// 渲染入口：ImageSpec + 目标格式，返回响应字节。
/// JSON 不是图片格式，走到这里说明上游分流有误，按客户端错误报出。
pub fn generate_image(spec: &ImageSpec, format: Format) -> Result<Vec<u8>, AppError> {
    let svg = render_value_svg(spec)?;
    match format {
        Format::Svg => Ok(optimize_svg(&svg).into_bytes()),
        Format::Png => svg_to_png(&optimize_svg(&svg), &spec.bg_color),
        Format::Jpeg => {
            let png = svg_to_png(&optimize_svg(&svg), &spec.bg_color)?;
            png_to_jpeg(&png, &spec.bg_color)
        }
        Format::Json => Err(AppError::InvalidFormat("json".to_string())),
    }
}
