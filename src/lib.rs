// cubscout-certs: Fill Cub Scout award certificates and rank cards from a CSV roster

pub mod compose;
pub mod error;
pub mod fit;
pub mod fonts;
pub mod generate;
pub mod layout;
pub mod limiter;
pub mod overlay;
pub mod record;
pub mod template;

pub use compose::{compose, map_display_shift, RenderConfig};
pub use error::AppError;
pub use generate::{Engine, GenerateRequest, OutputMode, Rank};
pub use record::{Record, ValidationReport, Workflow};
pub use template::{FieldCache, FieldRegion, Rotation, TemplateKind};
