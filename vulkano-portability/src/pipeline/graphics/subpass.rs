// Copyright (c) 2016 The vulkano developers
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or https://opensource.org/licenses/MIT>,
// at your option. All files in the project carrying such
// notice may not be copied, modified, or distributed except
// according to those terms.

//! The attachments that a graphics pipeline renders into.
//!
//! The native backend compiles attachment formats into the render pipeline state, so they must be
//! known when the pipeline is created.

use crate::{Format, ValidationError};

/// The formats of the attachments that a graphics pipeline will render into.
#[derive(Clone, Debug)]
pub struct PipelineRenderingCreateInfo {
    /// The formats of the color attachments that will be used during rendering.
    ///
    /// If an element is `None`, it indicates that the attachment will not be used.
    ///
    /// The default value is empty.
    pub color_attachment_formats: Vec<Option<Format>>,

    /// The format of the depth attachment that will be used during rendering.
    ///
    /// If set to `None`, it indicates that no depth attachment will be used.
    ///
    /// The default value is `None`.
    pub depth_attachment_format: Option<Format>,

    /// The format of the stencil attachment that will be used during rendering.
    ///
    /// If set to `None`, it indicates that no stencil attachment will be used.
    ///
    /// The default value is `None`.
    pub stencil_attachment_format: Option<Format>,

    pub _ne: crate::NonExhaustive,
}

impl Default for PipelineRenderingCreateInfo {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineRenderingCreateInfo {
    /// Returns a default `PipelineRenderingCreateInfo`.
    #[inline]
    pub const fn new() -> Self {
        Self {
            color_attachment_formats: Vec::new(),
            depth_attachment_format: None,
            stencil_attachment_format: None,
            _ne: crate::NonExhaustive(()),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), Box<ValidationError>> {
        let &Self {
            ref color_attachment_formats,
            depth_attachment_format,
            stencil_attachment_format,
            _ne: _,
        } = self;

        for (attachment_index, format) in color_attachment_formats
            .iter()
            .enumerate()
            .flat_map(|(i, f)| f.map(|f| (i, f)))
        {
            if format == Format::UNDEFINED || has_depth(format) || has_stencil(format) {
                return Err(Box::new(ValidationError {
                    context: format!("color_attachment_formats[{}]", attachment_index).into(),
                    problem: "is not a color format".into(),
                    vuids: &["VUID-VkGraphicsPipelineCreateInfo-renderPass-06582"],
                }));
            }
        }

        if let Some(format) = depth_attachment_format {
            if !has_depth(format) {
                return Err(Box::new(ValidationError {
                    context: "depth_attachment_format".into(),
                    problem: "format does not have a depth aspect".into(),
                    vuids: &["VUID-VkPipelineRenderingCreateInfo-depthAttachmentFormat-06587"],
                }));
            }
        }

        if let Some(format) = stencil_attachment_format {
            if !has_stencil(format) {
                return Err(Box::new(ValidationError {
                    context: "stencil_attachment_format".into(),
                    problem: "format does not have a stencil aspect".into(),
                    vuids: &["VUID-VkPipelineRenderingCreateInfo-stencilAttachmentFormat-06588"],
                }));
            }
        }

        if let (Some(depth_format), Some(stencil_format)) =
            (depth_attachment_format, stencil_attachment_format)
        {
            if depth_format != stencil_format {
                return Err(Box::new(ValidationError {
                    problem: "`depth_attachment_format` and `stencil_attachment_format` are both \
                        `Some`, but are not equal"
                        .into(),
                    vuids: &["VUID-VkPipelineRenderingCreateInfo-depthAttachmentFormat-06589"],
                    ..Default::default()
                }));
            }
        }

        Ok(())
    }
}

fn has_depth(format: Format) -> bool {
    matches!(
        format,
        Format::D16_UNORM
            | Format::X8_D24_UNORM_PACK32
            | Format::D32_SFLOAT
            | Format::D16_UNORM_S8_UINT
            | Format::D24_UNORM_S8_UINT
            | Format::D32_SFLOAT_S8_UINT
    )
}

fn has_stencil(format: Format) -> bool {
    matches!(
        format,
        Format::S8_UINT
            | Format::D16_UNORM_S8_UINT
            | Format::D24_UNORM_S8_UINT
            | Format::D32_SFLOAT_S8_UINT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_aspects() {
        let valid = PipelineRenderingCreateInfo {
            color_attachment_formats: vec![Some(Format::B8G8R8A8_UNORM), None],
            depth_attachment_format: Some(Format::D32_SFLOAT_S8_UINT),
            stencil_attachment_format: Some(Format::D32_SFLOAT_S8_UINT),
            ..Default::default()
        };
        assert!(valid.validate().is_ok());

        let depth_as_color = PipelineRenderingCreateInfo {
            color_attachment_formats: vec![Some(Format::D16_UNORM)],
            ..Default::default()
        };
        assert!(depth_as_color.validate().is_err());

        let mismatched = PipelineRenderingCreateInfo {
            depth_attachment_format: Some(Format::D32_SFLOAT),
            stencil_attachment_format: Some(Format::S8_UINT),
            ..Default::default()
        };
        assert!(mismatched.validate().is_err());
    }
}
