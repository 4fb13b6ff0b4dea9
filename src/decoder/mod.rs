pub mod video;

pub use video::OpenCvOpener;
