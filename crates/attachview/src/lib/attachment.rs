//! Attachment records and media-type dispatch

use serde::{Deserialize, Serialize};

pub const MEDIA_TYPE_GLTF: &str = "model/gltf+json";
pub const MEDIA_TYPE_GLB: &str = "model/gltf-binary";
pub const MEDIA_TYPE_JPEG: &str = "image/jpeg";
pub const MEDIA_TYPE_PNG: &str = "image/png";
/// Suffix shared by the vendor-specific analysis-primitive media types
pub const ANALYSIS_PRIMITIVES_SUFFIX: &str = "analysis-primitives+json";

/// Relation name of the link that points at the attachment payload
pub const DATA_REL: &str = "data";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(default)]
    pub method: Option<String>,
}

/// Attachment as served by the record service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: serde_json::Value,
    pub media_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Attachment {
    /// Href of the payload link, if the record has one
    pub fn data_href(&self) -> Option<&str> {
        self.links
            .iter()
            .find(|link| link.rel == DATA_REL)
            .map(|link| link.href.as_str())
    }

    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.media_type
        } else {
            &self.name
        }
    }
}

/// Which viewer renders an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerKind {
    Mesh,
    Image,
    Spline,
    Unsupported(String),
}

impl ViewerKind {
    pub fn for_media_type(media_type: &str) -> Self {
        let normalized = media_type.trim().to_ascii_lowercase();
        match normalized.as_str() {
            MEDIA_TYPE_GLTF | MEDIA_TYPE_GLB => Self::Mesh,
            MEDIA_TYPE_JPEG | MEDIA_TYPE_PNG => Self::Image,
            other if other.starts_with("application/") && other.ends_with(ANALYSIS_PRIMITIVES_SUFFIX) => {
                Self::Spline
            }
            _ => Self::Unsupported(media_type.to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ViewerKind::Mesh => "Mesh",
            ViewerKind::Image => "Image",
            ViewerKind::Spline => "Spline",
            ViewerKind::Unsupported(_) => "Unsupported",
        }
    }
}

/// Viewer choice plus the payload href it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub kind: ViewerKind,
    pub href: Option<String>,
    pub name: String,
}

/// Pick the viewer for an attachment. Without a data link nothing can be
/// shown, whatever the media type says.
pub fn route(attachment: &Attachment) -> Route {
    let href = attachment.data_href().map(str::to_string);
    let kind = match href {
        Some(_) => ViewerKind::for_media_type(&attachment.media_type),
        None => ViewerKind::Unsupported(attachment.media_type.clone()),
    };
    Route {
        kind,
        href,
        name: attachment.display_name().to_string(),
    }
}
