//! Entity records and identifier provenance.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::cache::keys;
use crate::remote::SelectQuery;

use super::{Entity, ReadMode};

/// How many posts the home listing fetches.
pub const POSTS_HOME_LIMIT: u32 = 20;

/// Where an identifier came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
  /// Assigned by the remote store on first successful insert.
  ServerIssued,
  /// Minted locally before the first save.
  ClientTemporary,
}

/// Opaque entity identifier.
///
/// Server-issued ids are 36 characters with no `_`; client-temporary ids are
/// `<kind>_<millis>`. Writes classify provenance to decide update vs insert:
/// getting this wrong either duplicates a row or updates nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  /// Mint a client-temporary identifier for a freshly drafted entity.
  pub fn temporary(kind: &str) -> Self {
    Self(format!("{}_{}", kind, Utc::now().timestamp_millis()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// The canonical classification rule: long and delimiter-free means the
  /// store issued it. The divergent length-10 / has-delimiter variants that
  /// used to float around disagree on short delimiter-free ids; this is the
  /// one rule used everywhere.
  pub fn provenance(&self) -> Provenance {
    if self.0.len() > 20 && !self.0.contains('_') {
      Provenance::ServerIssued
    } else {
      Provenance::ClientTemporary
    }
  }

  pub fn is_server_issued(&self) -> bool {
    self.provenance() == Provenance::ServerIssued
  }
}

impl std::fmt::Display for EntityId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Format a hex digest as the 36-character hyphenated shape the remote store
/// issues for identifiers. Needs at least 32 hex characters.
pub(crate) fn server_shaped_id(digest: &str) -> String {
  format!(
    "{}-{}-{}-{}-{}",
    &digest[0..8],
    &digest[8..12],
    &digest[12..16],
    &digest[16..20],
    &digest[20..32]
  )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FooterLink {
  pub id: String,
  pub label: String,
  pub url: String,
}

/// Singleton site configuration. `Default` is the hardcoded fallback used
/// when the remote read degrades on a first-ever visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
  pub name: String,
  pub slogan: String,
  pub logo_url: String,
  pub favicon_url: String,
  pub banner_url: String,
  pub principal_name: String,
  pub address: String,
  pub phone: String,
  pub email: String,
  pub hotline: String,
  pub map_url: String,
  pub facebook: String,
  pub youtube: String,
  pub zalo: String,
  pub website: String,
  pub show_welcome_banner: bool,
  pub home_news_count: u32,
  pub home_show_program: bool,
  pub primary_color: String,
  pub title_color: String,
  pub title_shadow_color: String,
  pub meta_title: String,
  pub meta_description: String,
  pub footer_links: Vec<FooterLink>,
}

impl Default for SiteConfig {
  fn default() -> Self {
    Self {
      name: "Trường PTDTBT TH và THCS Suối Lư".to_string(),
      slogan: "Trách nhiệm - Yêu thương - Sáng tạo".to_string(),
      logo_url: String::new(),
      favicon_url: String::new(),
      banner_url: String::new(),
      principal_name: String::new(),
      address: "Huyện Điện Biên Đông, Tỉnh Điện Biên".to_string(),
      phone: String::new(),
      email: String::new(),
      hotline: String::new(),
      map_url: String::new(),
      facebook: String::new(),
      youtube: String::new(),
      zalo: String::new(),
      website: String::new(),
      show_welcome_banner: true,
      home_news_count: 6,
      home_show_program: true,
      primary_color: "#1e3a8a".to_string(),
      title_color: "#fbbf24".to_string(),
      title_shadow_color: "rgba(0,0,0,0.8)".to_string(),
      meta_title: "Trường PTDTBT TH và THCS Suối Lư".to_string(),
      meta_description: "Website chính thức của Trường PTDTBT TH và THCS Suối Lư".to_string(),
      footer_links: vec![
        FooterLink {
          id: "1".to_string(),
          label: "Bộ Giáo dục & Đào tạo".to_string(),
          url: "https://moet.gov.vn".to_string(),
        },
        FooterLink {
          id: "2".to_string(),
          label: "Sở GD tỉnh Điện Biên".to_string(),
          url: "#".to_string(),
        },
        FooterLink {
          id: "3".to_string(),
          label: "Phòng GD Điện Biên Đông".to_string(),
          url: "#".to_string(),
        },
      ],
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub url: String,
}

fn published() -> String {
  "published".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Post {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub title: String,
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub summary: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub thumbnail: String,
  #[serde(default)]
  pub author: String,
  #[serde(default)]
  pub date: String,
  #[serde(default)]
  pub category: String,
  #[serde(default = "published")]
  pub status: String,
  #[serde(default)]
  pub is_featured: bool,
  #[serde(default)]
  pub show_on_home: bool,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub attachments: Vec<Attachment>,
  #[serde(default)]
  pub block_ids: Vec<String>,
  #[serde(default)]
  pub views: i64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<String>,
}

impl Entity for Post {
  const TABLE: &'static str = "posts";
  const KIND: &'static str = "post";
  const CACHE_KEY: Option<&'static str> = Some(keys::POSTS_HOME);
  const READ_MODE: ReadMode = ReadMode::CacheFirst;
  const CRITICAL: bool = true;
  // The store owns view counts; local saves must not clobber them.
  const SERVER_FIELDS: &'static [&'static str] = &["id", "created_at", "views"];

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new()
      .columns(
        "id, title, slug, summary, thumbnail, created_at, category, date, views, status, \
         is_featured, show_on_home",
      )
      .eq("status", "published")
      .order("created_at", false)
      .limit(POSTS_HOME_LIMIT)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostCategory {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub name: String,
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub color: String,
  #[serde(default)]
  pub order_index: i64,
}

impl Entity for PostCategory {
  const TABLE: &'static str = "post_categories";
  const KIND: &'static str = "postcat";
  const ORDER_COLUMN: Option<&'static str> = Some("order_index");

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new().order("order_index", true)
  }

  fn order_index(&self) -> Option<i64> {
    Some(self.order_index)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaffMember {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub full_name: String,
  #[serde(default)]
  pub position: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub party_date: Option<String>,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub avatar_url: String,
  #[serde(default)]
  pub order_index: i64,
}

impl Entity for StaffMember {
  const TABLE: &'static str = "staff_members";
  const KIND: &'static str = "staff";
  const CACHE_KEY: Option<&'static str> = Some(keys::STAFF);
  const READ_MODE: ReadMode = ReadMode::CacheFirst;

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new().order("order_index", true)
  }

  fn order_index(&self) -> Option<i64> {
    Some(self.order_index)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchoolDocument {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  #[serde(default)]
  pub number: String,
  pub title: String,
  #[serde(default)]
  pub date: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category_id: Option<EntityId>,
  #[serde(default)]
  pub download_url: String,
}

impl Entity for SchoolDocument {
  const TABLE: &'static str = "documents";
  const KIND: &'static str = "doc";

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new()
      .columns("id, number, title, date, category_id, download_url")
      .order("created_at", false)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentCategory {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub name: String,
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub order_index: i64,
}

impl Entity for DocumentCategory {
  const TABLE: &'static str = "document_categories";
  const KIND: &'static str = "doccat";
  const CACHE_KEY: Option<&'static str> = Some(keys::DOC_CATS);
  const ORDER_COLUMN: Option<&'static str> = Some("order_index");

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new().order("order_index", true)
  }

  fn order_index(&self) -> Option<i64> {
    Some(self.order_index)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryAlbum {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub thumbnail: String,
  #[serde(default)]
  pub created_date: String,
}

impl Entity for GalleryAlbum {
  const TABLE: &'static str = "gallery_albums";
  const KIND: &'static str = "album";

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new()
      .columns("id, title, description, thumbnail, created_date")
      .order("created_at", false)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryImage {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub url: String,
  #[serde(default)]
  pub caption: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub album_id: Option<EntityId>,
}

impl Entity for GalleryImage {
  const TABLE: &'static str = "gallery_images";
  const KIND: &'static str = "img";

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new()
      .columns("id, url, caption, album_id")
      .order("created_at", false)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Video {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub title: String,
  #[serde(default)]
  pub youtube_url: String,
  #[serde(default)]
  pub order_index: i64,
}

impl Entity for Video {
  const TABLE: &'static str = "videos";
  const KIND: &'static str = "video";

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new().order("order_index", true)
  }

  fn order_index(&self) -> Option<i64> {
    Some(self.order_index)
  }
}

fn default_accent() -> String {
  "#1e3a8a".to_string()
}

fn default_true() -> bool {
  true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayBlock {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub name: String,
  #[serde(default)]
  pub position: String,
  #[serde(rename = "type", default)]
  pub kind: String,
  #[serde(default)]
  pub order_index: i64,
  #[serde(default)]
  pub item_count: i64,
  #[serde(default = "default_true")]
  pub is_visible: bool,
  #[serde(default)]
  pub html_content: String,
  #[serde(default)]
  pub target_page: String,
  #[serde(default = "default_accent")]
  pub custom_color: String,
  #[serde(default = "default_accent")]
  pub custom_text_color: String,
}

impl Entity for DisplayBlock {
  const TABLE: &'static str = "display_blocks";
  const KIND: &'static str = "block";
  const ORDER_COLUMN: Option<&'static str> = Some("order_index");

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new().order("order_index", true)
  }

  fn order_index(&self) -> Option<i64> {
    Some(self.order_index)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MenuItem {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub label: String,
  #[serde(default)]
  pub path: String,
  #[serde(default)]
  pub order_index: i64,
}

impl Entity for MenuItem {
  const TABLE: &'static str = "menu_items";
  const KIND: &'static str = "menu";
  const CACHE_KEY: Option<&'static str> = Some(keys::MENU);
  const READ_MODE: ReadMode = ReadMode::CacheFirst;
  const ORDER_COLUMN: Option<&'static str> = Some("order_index");

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new().order("order_index", true)
  }

  fn order_index(&self) -> Option<i64> {
    Some(self.order_index)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntroArticle {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub title: String,
  #[serde(default)]
  pub slug: String,
  #[serde(default)]
  pub content: String,
  #[serde(default)]
  pub image_url: String,
  #[serde(default)]
  pub order_index: i64,
  #[serde(default = "default_true")]
  pub is_visible: bool,
}

impl Entity for IntroArticle {
  const TABLE: &'static str = "school_introductions";
  const KIND: &'static str = "intro";

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }

  fn list_query() -> SelectQuery {
    SelectQuery::new().order("order_index", true)
  }

  fn order_index(&self) -> Option<i64> {
    Some(self.order_index)
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<EntityId>,
  pub username: String,
  #[serde(default)]
  pub full_name: String,
  #[serde(default)]
  pub role: String,
}

impl Entity for UserProfile {
  const TABLE: &'static str = "user_profiles";
  const KIND: &'static str = "user";

  fn id(&self) -> Option<&EntityId> {
    self.id.as_ref()
  }
}
