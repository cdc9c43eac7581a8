/*
 * handlers/video.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * The `video` command.
 */

use datamd_config::{Configuration, Feature};

use super::dimension;
use crate::error::HandlerError;
use crate::handler::{DirectiveHandler, HandlerRequest, RenderedBlock};
use crate::sanitize::{ArgKind, ArgSpec, CommandSignature};

/// Embeds an HTML `<video>` element.
///
/// Usage: `{{ video "clip.mp4" [width] [height] [controls] [autoplay] }}`
pub struct VideoHandler;

impl DirectiveHandler for VideoHandler {
    fn name(&self) -> &str {
        "video"
    }

    fn signature(&self, _config: &Configuration) -> CommandSignature {
        CommandSignature::new(vec![
            ArgSpec::positional("width", 0, dimension(640)),
            ArgSpec::positional("height", 1, dimension(480)),
            ArgSpec::positional("controls", 2, ArgKind::Bool { default: true }),
            ArgSpec::positional("autoplay", 3, ArgKind::Bool { default: false }),
        ])
    }

    fn required_feature(&self) -> Option<Feature> {
        Some(Feature::VideoSupport)
    }

    fn handle(&self, request: &HandlerRequest<'_>) -> Result<RenderedBlock, HandlerError> {
        let args = request.args;
        let width = args.int("width").unwrap_or(640);
        let height = args.int("height").unwrap_or(480);

        let mut attributes = format!("width=\"{}\" height=\"{}\"", width, height);
        if args.bool("controls").unwrap_or(true) {
            attributes.push_str(" controls");
        }
        if args.bool("autoplay").unwrap_or(false) {
            attributes.push_str(" autoplay");
        }

        let src = escape_attribute(request.raw_path);
        let mime = mime_type(&request.path.extension());
        Ok(RenderedBlock::new(format!(
            "<video {}>\n  <source src=\"{}\" type=\"{}\">\n  Your browser does not support the video tag.\n</video>\n",
            attributes, src, mime
        )))
    }
}

fn mime_type(extension: &str) -> &'static str {
    match extension {
        "webm" => "video/webm",
        "ogg" | "ogv" => "video/ogg",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "wmv" => "video/x-ms-wmv",
        _ => "video/mp4",
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::resolve;
    use crate::sanitize::sanitize;
    use std::collections::BTreeMap;

    fn render(file: &str, positional: &[&str]) -> String {
        let config = Configuration::default();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(file), b"\0\0").unwrap();
        let path = resolve(file, dir.path(), &config.security).unwrap();
        let positional: Vec<String> = positional.iter().map(|p| p.to_string()).collect();
        let (args, _) =
            sanitize(&VideoHandler.signature(&config), &positional, &BTreeMap::new()).unwrap();
        VideoHandler
            .handle(&HandlerRequest {
                command: "video",
                path: &path,
                raw_path: file,
                args: &args,
                config: &config,
            })
            .unwrap()
            .markdown
    }

    #[test]
    fn test_defaults() {
        let out = render("clip.mp4", &[]);
        assert!(out.starts_with("<video width=\"640\" height=\"480\" controls>\n"));
        assert!(out.contains("<source src=\"clip.mp4\" type=\"video/mp4\">"));
    }

    #[test]
    fn test_arguments_are_clamped() {
        let out = render("clip.mov", &["9999", "0", "no", "yes"]);
        assert!(out.starts_with("<video width=\"4096\" height=\"1\" autoplay>\n"));
        assert!(out.contains("type=\"video/quicktime\""));
    }
}
