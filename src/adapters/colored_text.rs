//! Renders a volume as ANSI true-colour text, two spaces per cell.
//!
//! Each z-layer of cells becomes one block of text rows, top row first. The
//! rendering is lossy: with `Nearest` a cell shows the low 24 bits of the
//! colour at its lowest corner exactly; with `Linear` each RGB component is the
//! rounded mean over the cell, so it is within 0.5 of the true mean. Channels
//! other than colour are shown as grey, quantized to 256 levels over
//! `0..=non_color_max_value`, with larger values clamped.

use super::*;
use std::fmt::Write;

type Rgb = [u8; 3];

fn unpack_color(value: u32) -> Rgb {
    [value as u8, (value >> 8) as u8, (value >> 16) as u8]
}

pub struct ColoredTextSerializer {
    factor: u32,
    mode: ColoredTextSerializeAdapterDownscaleMode,
    non_color_max: u32,
    vertical: bool,
}

impl BaseAdapterHandler<Serialize, ColoredText> for ColoredTextSerializer {
    fn create(config: ColoredTextSerializeAdapterConfig) -> Result<Self> {
        let factor = config.downscale_factor.unwrap_or(1);
        let non_color_max = config.non_color_max_value.unwrap_or(255);
        if factor == 0 || non_color_max == 0 {
            return Err(VoxError::invalid_argument(
                "downscale factor and non-colour maximum must be positive",
            ));
        }
        Ok(Self {
            factor,
            mode: config.downscale_mode,
            non_color_max,
            vertical: config.vertical,
        })
    }
}

impl ColoredTextSerializer {
    fn to_rgb(&self, channel: ChannelId, value: u32) -> Rgb {
        if channel == ChannelId::COLOR {
            return unpack_color(value);
        }
        let level = (value.min(self.non_color_max) as u64 * 255 / self.non_color_max as u64) as u8;
        [level; 3]
    }

    /// The colours of one layer of cells, row-major with x fastest.
    fn render_layer(
        &self,
        blit: &mut SerializeBlitContext<'_>,
        slab: &RegionRange,
        channel: ChannelId,
        cells: (u32, u32),
    ) -> Result<Vec<Rgb>> {
        let count = (cells.0 * cells.1) as usize;
        if blit.query_region_flags(slab, channel)?.contains(RegionFlags::UNIFORM) {
            let voxel = blit.uniform_voxel(slab, channel)?;
            let rgb = self.to_rgb(channel, voxel.get(channel).unwrap_or_default());
            return Ok(vec![rgb; count]);
        }
        let region = blit.load_region(slab, channel)?;
        let layer = self.sample_cells(blit, &region, slab, channel, cells);
        blit.unload_region(region)?;
        layer
    }

    fn sample_cells(
        &self,
        blit: &mut SerializeBlitContext<'_>,
        region: &Region,
        slab: &RegionRange,
        channel: ChannelId,
        cells: (u32, u32),
    ) -> Result<Vec<Rgb>> {
        let mut layer = Vec::with_capacity((cells.0 * cells.1) as usize);
        for cy in 0..cells.1 {
            for cx in 0..cells.0 {
                let corner = Offset3D::new(
                    slab.offset.x + (cx * self.factor) as i32,
                    slab.offset.y + (cy * self.factor) as i32,
                    slab.offset.z,
                );
                let rgb = match self.mode {
                    ColoredTextSerializeAdapterDownscaleMode::Nearest => {
                        self.to_rgb(channel, blit.sample_region(region, &corner, channel)?)
                    }
                    ColoredTextSerializeAdapterDownscaleMode::Linear => {
                        let cell = RegionRange::new(corner, Extent3D::splat(self.factor))
                            .intersection(slab)
                            .unwrap_or(RegionRange::voxel(corner));
                        let mut sum = [0u64; 3];
                        for offset in cell.iter_offsets() {
                            let rgb = self.to_rgb(channel, blit.sample_region(region, &offset, channel)?);
                            for (s, c) in sum.iter_mut().zip(rgb) {
                                *s += c as u64;
                            }
                        }
                        let n = cell.volume().max(1);
                        sum.map(|s| ((s + n / 2) / n) as u8)
                    }
                };
                layer.push(rgb);
            }
        }
        Ok(layer)
    }
}

fn push_row(text: &mut String, layer: &[Rgb], width: u32, row: u32) {
    let start = (row * width) as usize;
    for [r, g, b] in &layer[start..start + width as usize] {
        let _ = write!(text, "\x1b[48;2;{r};{g};{b}m  ");
    }
    text.push_str("\x1b[0m");
}

impl SerializeAdapterHandler for ColoredTextSerializer {
    fn serialize_region(
        &mut self,
        blit: &mut SerializeBlitContext<'_>,
        range: &RegionRange,
        channels: ChannelId,
    ) -> Result<()> {
        if range.is_empty() {
            return Ok(());
        }
        let channel = if channels.contains(ChannelId::COLOR) {
            ChannelId::COLOR
        } else {
            channels.iter_channels().next().unwrap_or(ChannelId::COLOR)
        };
        let cells = |size: u32| size.div_ceil(self.factor);
        let (width, height, depth) = (cells(range.extent.x), cells(range.extent.y), cells(range.extent.z));

        let mut layers = Vec::with_capacity(depth as usize);
        for cz in 0..depth {
            let z = cz * self.factor;
            let slab = RegionRange::new(
                Offset3D::new(range.offset.x, range.offset.y, range.offset.z + z as i32),
                Extent3D::new(range.extent.x, range.extent.y, self.factor.min(range.extent.z - z)),
            );
            layers.push(self.render_layer(blit, &slab, channel, (width, height))?);
        }

        let mut text = String::new();
        if self.vertical {
            for (i, layer) in layers.iter().enumerate() {
                if i > 0 {
                    text.push('\n');
                }
                for row in (0..height).rev() {
                    push_row(&mut text, layer, width, row);
                    text.push('\n');
                }
            }
        } else {
            for row in (0..height).rev() {
                for (i, layer) in layers.iter().enumerate() {
                    if i > 0 {
                        text.push(' ');
                    }
                    push_row(&mut text, layer, width, row);
                }
                text.push('\n');
            }
        }
        blit.output_write(text.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_color_values_are_clamped_grey() {
        let serializer = ColoredTextSerializer::create(ColoredTextSerializeAdapterConfig {
            non_color_max_value: Some(4),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(serializer.to_rgb(ChannelId::MATERIAL_ID, 2), [127; 3]);
        assert_eq!(serializer.to_rgb(ChannelId::MATERIAL_ID, 40), [255; 3]);
        assert_eq!(serializer.to_rgb(ChannelId::COLOR, 0x00302010), [0x10, 0x20, 0x30]);
    }

    #[test]
    fn zero_factor_is_rejected() {
        let err = ColoredTextSerializer::create(ColoredTextSerializeAdapterConfig {
            downscale_factor: Some(0),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert_eq!(err.error_type(), ErrorType::InvalidArgument);
    }
}
