pub mod db;
pub mod media;
pub mod video;
pub mod yolo;

pub use db::DbAdapter;
pub use media::MediaStore;
pub use video::FfmpegVideoDecoder;
pub use yolo::YoloOnnxEngine;
