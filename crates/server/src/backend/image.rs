//! Container image allow-list.
//!
//! Clients request a runtime flavor by keyword; the keyword maps to a
//! fixed image reference. The map is compile-time on purpose: the server
//! never pulls an image a client names directly.

/// One allow-listed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageSpec {
    /// Keyword clients use in the `image` query parameter.
    pub key: &'static str,
    /// Full image reference pulled and run.
    pub reference: &'static str,
    /// Non-root user to run as, for images that ship one.
    pub user: Option<&'static str>,
}

/// The fixed set of images clients may request.
pub const ALLOWED_IMAGES: &[ImageSpec] = &[
    ImageSpec {
        key: "node",
        reference: "node:18-bullseye",
        user: Some("node"),
    },
    ImageSpec {
        key: "python",
        reference: "python:3.11-bullseye",
        user: None,
    },
    ImageSpec {
        key: "ubuntu",
        reference: "ubuntu:22.04",
        user: None,
    },
];

/// Keyword used when the client names no image or an unknown one.
pub const DEFAULT_IMAGE_KEY: &str = "node";

/// Resolve a requested image keyword against the allow-list.
///
/// Matching is case-insensitive; unknown or absent keywords resolve to the
/// default image rather than failing the connection.
pub fn resolve_image(requested: Option<&str>) -> &'static ImageSpec {
    let key = requested.map(str::to_lowercase);
    let key = key.as_deref().unwrap_or(DEFAULT_IMAGE_KEY);

    ALLOWED_IMAGES
        .iter()
        .find(|spec| spec.key == key)
        .or_else(|| ALLOWED_IMAGES.iter().find(|spec| spec.key == DEFAULT_IMAGE_KEY))
        .expect("default image key is present in ALLOWED_IMAGES")
}
