//! camrec Camera Model
//!
//! Defines the data contracts shared by the capture engine and the
//! control surfaces:
//! - **Cameras:** configured camera entries and the validated camera list
//! - **Segments:** the file naming scheme for recording segments
//!
//! Camera names are unique within a list. A name doubles as the display
//! title and as the prefix of every segment file recorded from it.

pub mod camera;
pub mod segment;

pub use camera::*;
pub use segment::*;
