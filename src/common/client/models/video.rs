use serde_derive::Deserialize;

// /web-interface/view 返回的视频详情
#[derive(Debug, Deserialize, Clone)]
pub struct ViewData {
    pub bvid: String,
    pub aid: u64,
    pub title: String,
    #[serde(default)]
    pub desc: String,
    pub duration: u64,
    #[serde(default)]
    pub pic: String,
    pub cid: u64,
    pub owner: VideoOwner,
    #[serde(default)]
    pub pages: Vec<VideoPage>,
    #[serde(default)]
    pub stat: VideoStat,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VideoOwner {
    pub mid: u64,
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VideoPage {
    pub cid: u64,
    pub page: u32,
    pub part: String,
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct VideoStat {
    #[serde(default)]
    pub view: u64,
    #[serde(default)]
    pub like: u64,
    #[serde(default)]
    pub danmaku: u64,
}

// /player/playurl 返回的播放地址
#[derive(Debug, Deserialize, Clone)]
pub struct PlayUrlData {
    #[serde(default)]
    pub accept_description: Vec<String>,
    #[serde(default)]
    pub accept_quality: Vec<u32>,
    pub quality: Option<u32>,
    pub dash: Option<DashInfo>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashInfo {
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub video: Vec<DashStream>,
    // 部分视频没有音轨，接口返回 null
    #[serde(default)]
    pub audio: Option<Vec<DashStream>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DashStream {
    pub id: u32,
    #[serde(alias = "baseUrl")]
    pub base_url: String,
    #[serde(default, alias = "backupUrl")]
    pub backup_url: Option<Vec<String>>,
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default, alias = "mimeType")]
    pub mime_type: String,
    #[serde(default)]
    pub codecs: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

// /web-interface/popular 返回的热门列表
#[derive(Debug, Deserialize, Clone)]
pub struct PopularData {
    #[serde(default)]
    pub list: Vec<PopularVideo>,
    #[serde(default)]
    pub no_more: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PopularVideo {
    pub bvid: String,
    pub title: String,
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub pic: String,
    #[serde(default)]
    pub pubdate: i64, // 发布时间，秒级时间戳
    #[serde(default)]
    pub owner: VideoOwner,
    #[serde(default)]
    pub stat: VideoStat,
}
