//! Email delivery for brand summaries: rendering, attachments, the `SendGrid`
//! provider and the per-recipient fan-out.

pub mod error;
pub mod map;
pub mod message;
pub mod notifier;
pub mod provider;

pub use error::SendError;
pub use map::{lat_lon_to_tile, tile_for_point, zoom_for_1km_box, MapRenderer, TileCoord};
pub use message::{
    build_message, dashboard_url, subject_line, truncate_title, unsubscribe_url, Attachment,
    MessageSettings, OutgoingMessage, MAP_IMAGE_CID, REPORT_IMAGE_CID,
};
pub use notifier::{EmailNotifier, Notifier, RecipientOutcome};
pub use provider::{LogOnlyProvider, MailProvider, ProviderResponse, SendGridProvider};
