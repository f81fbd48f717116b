use std::collections::HashMap;
use wgpu::TextureFormat;

/// Storage size and channel count of a texel format.
///
/// Block compressed formats report their average bits per texel (e.g. 4 for BC1), so a byte size is only
/// computable for them when the bit count is a multiple of 8.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FormatInfo {
    pub bits_per_texel: u32,
    pub channel_count: u32,
}

const fn info(bits_per_texel: u32, channel_count: u32) -> FormatInfo {
    FormatInfo {
        bits_per_texel,
        channel_count,
    }
}

// Formats with implementation defined size (Depth24Plus & co, planar video formats) are not listed.
#[rustfmt::skip]
static FORMAT_TABLE: &[(TextureFormat, FormatInfo)] = &[
    // 8 bit
    (TextureFormat::R8Unorm, info(8, 1)),
    (TextureFormat::R8Snorm, info(8, 1)),
    (TextureFormat::R8Uint, info(8, 1)),
    (TextureFormat::R8Sint, info(8, 1)),
    (TextureFormat::Stencil8, info(8, 1)),
    // 16 bit
    (TextureFormat::R16Uint, info(16, 1)),
    (TextureFormat::R16Sint, info(16, 1)),
    (TextureFormat::R16Unorm, info(16, 1)),
    (TextureFormat::R16Snorm, info(16, 1)),
    (TextureFormat::R16Float, info(16, 1)),
    (TextureFormat::Rg8Unorm, info(16, 2)),
    (TextureFormat::Rg8Snorm, info(16, 2)),
    (TextureFormat::Rg8Uint, info(16, 2)),
    (TextureFormat::Rg8Sint, info(16, 2)),
    (TextureFormat::Depth16Unorm, info(16, 1)),
    // 32 bit
    (TextureFormat::R32Uint, info(32, 1)),
    (TextureFormat::R32Sint, info(32, 1)),
    (TextureFormat::R32Float, info(32, 1)),
    (TextureFormat::Rg16Uint, info(32, 2)),
    (TextureFormat::Rg16Sint, info(32, 2)),
    (TextureFormat::Rg16Unorm, info(32, 2)),
    (TextureFormat::Rg16Snorm, info(32, 2)),
    (TextureFormat::Rg16Float, info(32, 2)),
    (TextureFormat::Rgba8Unorm, info(32, 4)),
    (TextureFormat::Rgba8UnormSrgb, info(32, 4)),
    (TextureFormat::Rgba8Snorm, info(32, 4)),
    (TextureFormat::Rgba8Uint, info(32, 4)),
    (TextureFormat::Rgba8Sint, info(32, 4)),
    (TextureFormat::Bgra8Unorm, info(32, 4)),
    (TextureFormat::Bgra8UnormSrgb, info(32, 4)),
    (TextureFormat::Rgb9e5Ufloat, info(32, 3)),
    (TextureFormat::Rgb10a2Uint, info(32, 4)),
    (TextureFormat::Rgb10a2Unorm, info(32, 4)),
    (TextureFormat::Depth32Float, info(32, 1)),
    // 64 bit
    (TextureFormat::Rg32Uint, info(64, 2)),
    (TextureFormat::Rg32Sint, info(64, 2)),
    (TextureFormat::Rg32Float, info(64, 2)),
    (TextureFormat::Rgba16Uint, info(64, 4)),
    (TextureFormat::Rgba16Sint, info(64, 4)),
    (TextureFormat::Rgba16Unorm, info(64, 4)),
    (TextureFormat::Rgba16Snorm, info(64, 4)),
    (TextureFormat::Rgba16Float, info(64, 4)),
    (TextureFormat::Depth32FloatStencil8, info(64, 2)),
    // 128 bit
    (TextureFormat::Rgba32Uint, info(128, 4)),
    (TextureFormat::Rgba32Sint, info(128, 4)),
    (TextureFormat::Rgba32Float, info(128, 4)),
    // block compressed, 4x4 blocks
    (TextureFormat::Bc1RgbaUnorm, info(4, 4)),
    (TextureFormat::Bc1RgbaUnormSrgb, info(4, 4)),
    (TextureFormat::Bc2RgbaUnorm, info(8, 4)),
    (TextureFormat::Bc2RgbaUnormSrgb, info(8, 4)),
    (TextureFormat::Bc3RgbaUnorm, info(8, 4)),
    (TextureFormat::Bc3RgbaUnormSrgb, info(8, 4)),
    (TextureFormat::Bc4RUnorm, info(4, 1)),
    (TextureFormat::Bc4RSnorm, info(4, 1)),
    (TextureFormat::Bc5RgUnorm, info(8, 2)),
    (TextureFormat::Bc5RgSnorm, info(8, 2)),
    (TextureFormat::Bc6hRgbUfloat, info(8, 3)),
    (TextureFormat::Bc6hRgbFloat, info(8, 3)),
    (TextureFormat::Bc7RgbaUnorm, info(8, 4)),
    (TextureFormat::Bc7RgbaUnormSrgb, info(8, 4)),
    (TextureFormat::Etc2Rgb8Unorm, info(4, 3)),
    (TextureFormat::Etc2Rgb8UnormSrgb, info(4, 3)),
    (TextureFormat::Etc2Rgb8A1Unorm, info(4, 4)),
    (TextureFormat::Etc2Rgb8A1UnormSrgb, info(4, 4)),
    (TextureFormat::Etc2Rgba8Unorm, info(8, 4)),
    (TextureFormat::Etc2Rgba8UnormSrgb, info(8, 4)),
    (TextureFormat::EacR11Unorm, info(4, 1)),
    (TextureFormat::EacR11Snorm, info(4, 1)),
    (TextureFormat::EacRg11Unorm, info(8, 2)),
    (TextureFormat::EacRg11Snorm, info(8, 2)),
];

lazy_static! {
    static ref FORMAT_INFOS: HashMap<TextureFormat, FormatInfo> = FORMAT_TABLE.iter().copied().collect();
}

pub fn format_info(format: TextureFormat) -> Option<FormatInfo> {
    FORMAT_INFOS.get(&format).copied()
}

/// Bytes per texel or 0 if the format is unknown (or its texels don't have a whole byte size).
pub fn bytes_per_texel(format: TextureFormat) -> u32 {
    match format_info(format) {
        Some(info) if info.bits_per_texel % 8 == 0 => info.bits_per_texel / 8,
        _ => 0,
    }
}

/// Channel count or 0 if the format is unknown.
pub fn channel_count(format: TextureFormat) -> u32 {
    format_info(format).map_or(0, |info| info.channel_count)
}

/// Row and slice pitch in bytes of a tightly packed cube of `resolution`^3 texels.
///
/// `None` if the format has no whole byte size or a pitch doesn't fit into 32 bits.
pub fn upload_pitches(format: TextureFormat, resolution: u32) -> Option<(u32, u32)> {
    match bytes_per_texel(format) {
        0 => None,
        bytes_per_texel => {
            let row_pitch = bytes_per_texel.checked_mul(resolution)?;
            Some((row_pitch, row_pitch.checked_mul(resolution)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulation_formats() {
        assert_eq!(bytes_per_texel(TextureFormat::Rgba32Float), 16);
        assert_eq!(channel_count(TextureFormat::Rgba32Float), 4);
        assert_eq!(bytes_per_texel(TextureFormat::R32Float), 4);
        assert_eq!(channel_count(TextureFormat::R32Float), 1);
        assert_eq!(bytes_per_texel(TextureFormat::Rgba16Float), 8);
    }

    #[test]
    fn unknown_formats_have_no_size() {
        assert_eq!(bytes_per_texel(TextureFormat::Depth24Plus), 0);
        assert_eq!(channel_count(TextureFormat::Depth24PlusStencil8), 0);
        assert_eq!(upload_pitches(TextureFormat::Depth24Plus, 64), None);
    }

    #[test]
    fn compressed_formats() {
        assert_eq!(format_info(TextureFormat::Bc1RgbaUnorm), Some(FormatInfo { bits_per_texel: 4, channel_count: 4 }));
        assert_eq!(bytes_per_texel(TextureFormat::Bc1RgbaUnorm), 0);
        assert_eq!(bytes_per_texel(TextureFormat::Bc7RgbaUnorm), 1);
    }

    #[test]
    fn table_has_no_duplicates() {
        assert_eq!(FORMAT_INFOS.len(), FORMAT_TABLE.len());
    }

    #[test]
    fn pitches() {
        assert_eq!(upload_pitches(TextureFormat::Rgba32Float, 64), Some((1024, 65536)));
        assert_eq!(upload_pitches(TextureFormat::R32Float, 8), Some((32, 256)));
        assert_eq!(upload_pitches(TextureFormat::Rgba32Float, 2048), Some((32768, 67108864)));
    }

    #[test]
    fn oversized_pitches() {
        assert_eq!(upload_pitches(TextureFormat::Rgba32Float, 16384), None);
        assert_eq!(upload_pitches(TextureFormat::R8Unorm, u32::MAX), None);
    }
}
