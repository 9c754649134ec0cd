pub mod url_parser;

pub use url_parser::{
    bilibili_video_id, is_playlist, is_well_formed, sanitize_input, youtube_video_id,
};
