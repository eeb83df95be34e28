//! QR code for sharing the room link.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::{svg, unicode};

/// Pixel size of the rendered SVG.
pub const QR_WIDTH: u32 = 200;

/// Errors from QR generation.
#[derive(Debug, thiserror::Error)]
pub enum QrError {
    #[error("nothing to encode")]
    EmptyUrl,

    #[error("QR encoding failed: {0}")]
    Encode(#[from] qrcode::types::QrError),
}

/// The link other devices open to join: the server URL plus the room code
/// when codes are enabled.
pub fn share_url(server_url: &str, room_code: Option<&str>, code_enabled: bool) -> String {
    match room_code.filter(|c| code_enabled && !c.is_empty()) {
        Some(code) => {
            let separator = if server_url.contains('?') { '&' } else { '?' };
            format!("{server_url}{separator}code={code}")
        }
        None => server_url.to_string(),
    }
}

/// A generated QR code for a share link.
#[derive(Debug, Clone)]
pub struct QrImage {
    /// The encoded link, for display next to the code.
    pub url: String,
    /// `data:image/svg+xml;base64,...` for embedding in a page.
    pub data_url: String,
    /// Block-character rendering for terminals.
    pub text: String,
}

impl QrImage {
    pub fn generate(url: &str) -> Result<Self, QrError> {
        if url.is_empty() {
            return Err(QrError::EmptyUrl);
        }
        let code = QrCode::new(url.as_bytes())?;

        let svg = code
            .render::<svg::Color>()
            .min_dimensions(QR_WIDTH, QR_WIDTH)
            .quiet_zone(true)
            .build();
        let data_url = format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg));

        let text = code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .quiet_zone(true)
            .build();

        Ok(Self {
            url: url.to_string(),
            data_url,
            text,
        })
    }
}
