use std::fmt;
use std::str::FromStr;

/// 連携対象のソーシャルプラットフォーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Instagram,
    Facebook,
    Tiktok,
    Threads,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Instagram,
        Platform::Facebook,
        Platform::Tiktok,
        Platform::Threads,
    ];

    /// DB に保存する値（例: "INSTAGRAM"）
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instagram => "INSTAGRAM",
            Self::Facebook => "FACEBOOK",
            Self::Tiktok => "TIKTOK",
            Self::Threads => "THREADS",
        }
    }

    /// URL パスおよびディレクトリのキーに使う値（例: "instagram"）
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Instagram => "instagram",
            Self::Facebook => "facebook",
            Self::Tiktok => "tiktok",
            Self::Threads => "threads",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.slug() == slug)
    }

    /// プレースホルダーアバターの背景色（16進、# なし）
    pub fn avatar_background(&self) -> &'static str {
        match self {
            Self::Instagram => "5851DB",
            Self::Facebook => "1877F2",
            Self::Tiktok => "000000",
            Self::Threads => "101010",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown platform: {}", s))
    }
}
