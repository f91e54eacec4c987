use serde::Serialize;

/// Default avatar for users who never uploaded a profile photo.
pub const DEFAULT_PROFILE_PHOTO: &str =
    "https://cdn.pixabay.com/photo/2015/10/05/22/37/blank-profile-picture-973460_960_720.png";

/// Reference to an image held by the image host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub url: String,
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bio: Option<String>,
    pub profile_photo: ImageRef,
    pub is_admin: bool,
    pub is_account_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Public view of a post or comment author.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub username: String,
    pub profile_photo: ImageRef,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub description: String,
    pub user: Author,
    pub category: Option<CategorySummary>,
    pub likes: Vec<String>,
    pub image: Option<ImageRef>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub user: Author,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

/// What a verification token may be redeemed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPurpose {
    Verify,
    Reset,
}

impl TokenPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenPurpose::Verify => "verify",
            TokenPurpose::Reset => "reset",
        }
    }
}

pub(crate) fn image_ref(url: Option<String>, public_id: Option<String>) -> Option<ImageRef> {
    url.map(|url| ImageRef { url, public_id })
}

pub(crate) fn profile_photo(url: Option<String>, public_id: Option<String>) -> ImageRef {
    image_ref(url, public_id).unwrap_or_else(|| ImageRef {
        url: DEFAULT_PROFILE_PHOTO.to_string(),
        public_id: None,
    })
}
