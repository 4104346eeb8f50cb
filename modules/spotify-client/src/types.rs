use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    pub artists: ArtistPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistPage {
    pub items: Vec<SpotifyArtist>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub followers: Followers,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub popularity: u32,
    pub external_urls: ExternalUrls,
}

impl SpotifyArtist {
    /// Largest avatar image, if any.
    pub fn avatar_url(&self) -> Option<&str> {
        self.images.first().map(|i| i.url.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Followers {
    #[serde(default)]
    pub total: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalUrls {
    #[serde(default)]
    pub spotify: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopTracksResponse {
    pub tracks: Vec<SpotifyTrack>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub popularity: u32,
}
