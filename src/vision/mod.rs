//! Vision/OCR Layer
//!
//! Everything between a captured frame and recognized text:
//! - region of interest selection
//! - preprocessing of the cropped region
//! - the recognition engine boundary

pub mod ocr;
pub mod preprocess;
pub mod region;

pub use ocr::{
    Recognition, RecognitionEngine, RecognitionError, RecognitionRequest, ScriptedEngine, ScriptedResponse,
};
pub use preprocess::prepare_region;
pub use region::{active_region, Region};
