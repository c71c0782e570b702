pub const APP_NAME: &str = "xef2mat";

pub const CONFIG_FILE: &str = "xef2mat.config";
pub const ERROR_LOG_FILE: &str = "error.log";
pub const DEBUG_LOG_FILE: &str = "debug.log";

pub const DEFAULT_OUTPUT_DIR: &str = "Xef2Mat_Output";

// Depth and infrared frames share one sensor geometry
pub const DEPTH_WIDTH: usize = 512;
pub const DEPTH_HEIGHT: usize = 424;

pub const COLOR_WIDTH: usize = 1920;
pub const COLOR_HEIGHT: usize = 1080;

// Capture container file layout
pub const CONTAINER_MAGIC: &[u8; 4] = b"XEFC";
pub const CONTAINER_VERSION: u16 = 1;

pub const TAG_DEPTH: &str = "depth";
pub const TAG_INFRARED: &str = "infrared";
pub const TAG_COLOR: &str = "color";

// Absolute timestamps: 2-digit year/month/day, unpadded hour,
// 2-digit minute/second, 3-digit millisecond, no separators.
pub const ABSOLUTE_TIME_FORMAT: &str = "%y%m%d%-H%M%S%3f";
