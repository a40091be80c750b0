//! Built-in task handlers.
//!
//! | Name          | Output artifact(s)                                         |
//! |---------------|------------------------------------------------------------|
//! | `doc_convert` | `zip/{stem}.images.zip` (`images_zip`)                     |
//! | `to_pdf`      | `to-pdf/{stem}.pdf` (`pdf`)                                |
//! | `vlm_ocr`     | `vlm/extract/…`, `vlm/images/…` manifests and layout PDF   |

pub mod doc_convert;
pub mod to_pdf;
pub mod vlm_ocr;

pub use doc_convert::DocConvertHandler;
pub use to_pdf::ToPdfHandler;
pub use vlm_ocr::{OcrEngine, OcrOutputDirs, VlmOcrHandler};
