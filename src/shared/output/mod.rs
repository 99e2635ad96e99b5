pub mod collect;
pub mod json;
pub mod render;
pub mod text;

pub use collect::CollectingPrinter;
pub use json::JsonLinesPrinter;
pub use render::{OutputFormat, RecordPrinter};
pub use text::TextPrinter;

use std::io::Write;

pub fn printer_for<W: Write + Send + 'static>(format: OutputFormat, out: W) -> Box<dyn RecordPrinter> {
    match format {
        OutputFormat::Text => Box::new(TextPrinter::new(out)),
        OutputFormat::Json => Box::new(JsonLinesPrinter::new(out)),
    }
}
