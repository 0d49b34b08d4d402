/// RGB 图像缩放 (fast_image_resize, Bilinear)
use anyhow::{Context, Result};
use fast_image_resize as fr;
use image::RgbImage;

/// 将 3 通道图像缩放到 `width` x `height`
///
/// Works on any 3-channel u8 buffer, HSV frames included.
pub fn resize_rgb(
    resizer: &mut fr::Resizer,
    src: &RgbImage,
    width: u32,
    height: u32,
) -> Result<RgbImage> {
    if src.width() == width && src.height() == height {
        return Ok(src.clone());
    }

    let src_image = fr::images::Image::from_vec_u8(
        src.width(),
        src.height(),
        src.as_raw().clone(),
        fr::PixelType::U8x3,
    )
    .context("invalid source buffer")?;

    let mut dst_image = fr::images::Image::new(width, height, fr::PixelType::U8x3);
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .context("resize failed")?;

    RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
        .context("resized buffer size mismatch")
}
