// 应用外壳页面：页头、内容区（Leaflet 地图）、页脚
pub const SHELL_HTML: &str = include_str!("shell.html");
