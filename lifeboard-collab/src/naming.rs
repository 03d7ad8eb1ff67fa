//! Human-readable lobby keys.
//!
//! Keys come from a [`NameSource`] (by default a random Magic card name from
//! the Scryfall API), sanitized into a URL-friendly slug:
//!
//! ```text
//! "Kozilek, Butcher of Truth"  →  "kozilek-butcher-of-truth"
//! ```
//!
//! The generator retries on collision with a resident lobby or on source
//! failure, up to a fixed number of attempts, then falls back to locally
//! generated keys. It always returns.

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::NamingConfig;
use crate::error::NamingError;
use crate::store::LobbyStore;

/// Length of the random part of a fallback key.
const FALLBACK_SUFFIX_LEN: usize = 8;

/// Supplier of candidate lobby names.
#[async_trait]
pub trait NameSource: Send + Sync {
    /// Fetch one raw (unsanitized) candidate name.
    async fn fetch_name(&self) -> Result<String, NamingError>;
}

/// Response body of `GET /cards/random`; everything but the name is ignored.
#[derive(Debug, Deserialize)]
struct RandomCard {
    name: String,
}

/// Random card names from the Scryfall API.
pub struct ScryfallSource {
    client: reqwest::Client,
    url: String,
}

impl ScryfallSource {
    pub fn new(config: &NamingConfig) -> Result<Self, NamingError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl NameSource for ScryfallSource {
    async fn fetch_name(&self) -> Result<String, NamingError> {
        let card: RandomCard = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(card.name)
    }
}

/// Turn a display name into a lobby key.
///
/// Lowercases, turns spaces into hyphens, folds accented Latin letters to
/// ASCII (`Æ` → `ae`, `û` → `u`) and drops apostrophes, commas, colons and
/// anything else outside `[a-z0-9-]`. Runs of hyphens collapse and
/// leading/trailing hyphens are trimmed, so the result may be empty.
pub fn sanitize(raw: &str) -> String {
    let mut slug = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        if c == ' ' || c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
            }
        } else if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if let Some(folded) = fold_latin(c) {
            slug.push_str(folded);
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// ASCII spelling of a lowercase Latin letter with diacritics.
fn fold_latin(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' | 'ð' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'þ' => "th",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(folded)
}

/// A locally generated key, used once the name source has been exhausted.
pub fn random_key() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(FALLBACK_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("lobby-{suffix}")
}

/// Produces lobby keys that are not currently resident in the store.
pub struct IdentifierGenerator {
    source: Arc<dyn NameSource>,
    store: Arc<LobbyStore>,
    max_attempts: usize,
}

impl IdentifierGenerator {
    pub fn new(source: Arc<dyn NameSource>, store: Arc<LobbyStore>, max_attempts: usize) -> Self {
        Self {
            source,
            store,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Generate a key that is not a resident lobby.
    ///
    /// At most `max_attempts` source fetches, then at most `max_attempts`
    /// local random keys, then a UUID.
    pub async fn generate(&self) -> String {
        for attempt in 1..=self.max_attempts {
            match self.source.fetch_name().await {
                Ok(raw) => {
                    let key = sanitize(&raw);
                    if key.is_empty() {
                        log::warn!(
                            "Naming attempt {attempt}: {}",
                            NamingError::UnusableName(raw)
                        );
                    } else if self.store.contains(&key).await {
                        log::debug!("Naming attempt {attempt}: {key:?} is taken");
                    } else {
                        return key;
                    }
                }
                Err(e) => log::warn!("Naming attempt {attempt}: {e}"),
            }
        }

        log::warn!(
            "Name source gave no usable key after {} attempts, using local fallback",
            self.max_attempts
        );
        for _ in 0..self.max_attempts {
            let key = random_key();
            if !self.store.contains(&key).await {
                return key;
            }
        }

        Uuid::new_v4().simple().to_string()
    }
}
