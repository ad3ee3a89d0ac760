//! Order JSON model and descriptor derivation
//!
//! The structures below mirror the parts of the order API response that the
//! downloader needs. Every field is optional on the wire; missing or `null`
//! values fall back to defaults and are caught by validation when turning
//! entries into [`RemoteFileDescriptor`]s.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer};
use url::Url;

use crate::app::hash::Md5Hash;
use crate::app::models::{PlatformSelection, RemoteFileDescriptor};

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Entry of the order list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct OrderKey {
    pub gamekey: String,
}

/// One purchase and the files it grants
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Order {
    #[serde(default, deserialize_with = "null_as_default")]
    pub gamekey: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub product: Product,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subproducts: Vec<Subproduct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub human_name: Option<String>,
    #[serde(default)]
    pub machine_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// A single title inside an order
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subproduct {
    #[serde(default)]
    pub machine_name: Option<String>,
    #[serde(default)]
    pub human_name: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub downloads: Vec<Download>,
}

/// Files of a subproduct for one platform
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Download {
    #[serde(default)]
    pub machine_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub download_struct: Vec<DownloadStruct>,
}

/// One downloadable file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadStruct {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
    #[serde(default)]
    pub human_size: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub url: Option<DownloadUrls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DownloadUrls {
    #[serde(default)]
    pub web: Option<String>,
    #[serde(default)]
    pub bittorrent: Option<String>,
}

/// Classification of one catalog file before any local check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntry {
    /// Complete metadata on a selected platform
    Valid(RemoteFileDescriptor),
    /// Metadata unusable; the item is skipped
    Invalid {
        order_key: String,
        label: String,
        reason: String,
    },
    /// Platform not selected for this run
    PlatformSkipped {
        order_key: String,
        label: String,
        platform: String,
    },
}

impl Order {
    /// Display name of the order's product
    pub fn display_name(&self) -> &str {
        self.product
            .human_name
            .as_deref()
            .or(self.product.machine_name.as_deref())
            .unwrap_or(&self.gamekey)
    }

    /// Classify every file in the order
    pub fn entries(&self, platforms: &PlatformSelection) -> Vec<CatalogEntry> {
        let mut entries = Vec::new();

        for subproduct in &self.subproducts {
            let product_dir = subproduct.product_dir();
            for download in &subproduct.downloads {
                let platform = download.platform.clone().unwrap_or_default();
                for file in &download.download_struct {
                    let file_name = file.file_name();
                    let label = format!("{}/{}/{}", product_dir, platform, file_name);

                    if !platforms.is_enabled(&platform) {
                        entries.push(CatalogEntry::PlatformSkipped {
                            order_key: self.gamekey.clone(),
                            label,
                            platform: platform.clone(),
                        });
                        continue;
                    }

                    let entry = match self.describe(subproduct, &product_dir, &platform, file) {
                        Ok(descriptor) => CatalogEntry::Valid(descriptor),
                        Err(reason) => CatalogEntry::Invalid {
                            order_key: self.gamekey.clone(),
                            label,
                            reason,
                        },
                    };
                    entries.push(entry);
                }
            }
        }

        entries
    }

    /// Descriptors of every valid file on a selected platform
    pub fn descriptors(&self, platforms: &PlatformSelection) -> Vec<RemoteFileDescriptor> {
        self.entries(platforms)
            .into_iter()
            .filter_map(|entry| match entry {
                CatalogEntry::Valid(descriptor) => Some(descriptor),
                _ => None,
            })
            .collect()
    }

    fn describe(
        &self,
        subproduct: &Subproduct,
        product_dir: &str,
        platform: &str,
        file: &DownloadStruct,
    ) -> Result<RemoteFileDescriptor, String> {
        let web_url = file
            .url
            .as_ref()
            .and_then(|urls| urls.web.as_deref())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| "no web download URL".to_string())?;
        Url::parse(web_url).map_err(|e| format!("invalid download URL: {}", e))?;

        let expected_size = match file.file_size {
            Some(size) if size > 0 => size,
            _ => return Err("missing or zero file size".to_string()),
        };

        let md5 = file
            .md5
            .as_deref()
            .ok_or_else(|| "missing md5".to_string())?;
        let expected_checksum =
            Md5Hash::from_hex(md5.trim()).map_err(|_| format!("invalid md5 '{}'", md5))?;

        let logical_path = logical_path(product_dir, platform, &file.file_name())?;

        Ok(RemoteFileDescriptor {
            order_key: self.gamekey.clone(),
            url: web_url.to_string(),
            expected_size,
            expected_checksum,
            logical_path,
            platform: platform.to_string(),
            product_name: subproduct
                .human_name
                .clone()
                .unwrap_or_else(|| product_dir.to_string()),
            human_size: file.human_size.clone().unwrap_or_default(),
        })
    }
}

impl Subproduct {
    /// Directory name for the subproduct's files
    ///
    /// The machine name with a trailing `withsoundtrack` removed, cut at the
    /// first underscore.
    pub fn product_dir(&self) -> String {
        let name = self.machine_name.as_deref().unwrap_or_default();
        let name = name.strip_suffix("withsoundtrack").unwrap_or(name);
        name.split('_').next().unwrap_or_default().to_string()
    }
}

impl DownloadStruct {
    /// File name derived from the download URL path
    ///
    /// The web URL is preferred over the bittorrent one. The leading `/` is
    /// dropped and the remaining separators become underscores.
    pub fn file_name(&self) -> String {
        let Some(urls) = &self.url else {
            return String::new();
        };
        let source = urls
            .web
            .as_deref()
            .filter(|url| !url.is_empty())
            .or(urls.bittorrent.as_deref())
            .unwrap_or_default();

        let path = match Url::parse(source) {
            Ok(url) => url.path().to_string(),
            Err(_) => source.split(['?', '#']).next().unwrap_or_default().to_string(),
        };

        path.strip_prefix('/').unwrap_or(&path).replace('/', "_")
    }
}

/// `<product>/<platform>/<file>` with every component checked
fn logical_path(product_dir: &str, platform: &str, file_name: &str) -> Result<PathBuf, String> {
    let mut path = PathBuf::new();
    for (what, component) in [
        ("product", product_dir),
        ("platform", platform),
        ("file name", file_name),
    ] {
        let mut components = Path::new(component).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => path.push(component),
            _ => return Err(format!("unusable {} '{}'", what, component)),
        }
    }
    Ok(path)
}
