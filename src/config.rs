use serde::Deserialize;

/// Collections searched by the ultra search when `SEARCH_COLLECTIONS` is unset.
pub const DEFAULT_SEARCH_COLLECTIONS: &[&str] = &[
    "personas_fisicas_fast2m",
    "personas_juridicas_fast2m",
    "tse_datos_hibridos",
    "personas_fisicas",
    "ultra_deep_extraction",
    "personas_juridicas",
    "daticos_datos_masivos",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub db_name: String, // Reported by /api/health, the pool itself uses database_url
    pub admin_username: String,
    pub admin_password: String,
    pub google_maps_api_key: Option<String>,
    pub google_maps_base_url: String,
    pub search_collections: Vec<String>,
    pub primary_collection: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            db_name: std::env::var("DB_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "datatico_cr".to_string()),
            admin_username: std::env::var("ADMIN_USERNAME")
                .map_err(|_| anyhow::anyhow!("ADMIN_USERNAME environment variable required"))
                .and_then(|user| {
                    if user.trim().is_empty() {
                        anyhow::bail!("ADMIN_USERNAME cannot be empty");
                    }
                    Ok(user)
                })?,
            admin_password: std::env::var("ADMIN_PASSWORD")
                .map_err(|_| anyhow::anyhow!("ADMIN_PASSWORD environment variable required"))
                .and_then(|pass| {
                    if pass.trim().is_empty() {
                        anyhow::bail!("ADMIN_PASSWORD cannot be empty");
                    }
                    Ok(pass)
                })?,
            google_maps_api_key: std::env::var("GOOGLE_MAPS_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            google_maps_base_url: std::env::var("GOOGLE_MAPS_BASE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|url| {
                    if !url.starts_with("http://") && !url.starts_with("https://") {
                        anyhow::bail!("GOOGLE_MAPS_BASE_URL must start with http:// or https://");
                    }
                    Ok(url.trim_end_matches('/').to_string())
                })
                .transpose()?
                .unwrap_or_else(|| "https://maps.googleapis.com".to_string()),
            search_collections: match std::env::var("SEARCH_COLLECTIONS") {
                Ok(raw) if !raw.trim().is_empty() => parse_collection_list(&raw)?,
                _ => DEFAULT_SEARCH_COLLECTIONS
                    .iter()
                    .map(|c| c.to_string())
                    .collect(),
            },
            primary_collection: std::env::var("PRIMARY_COLLECTION")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(|c| {
                    let c = c.trim().to_string();
                    if !crate::db_storage::is_valid_identifier(&c) {
                        anyhow::bail!("PRIMARY_COLLECTION '{}' is not a valid collection name", c);
                    }
                    Ok(c)
                })
                .transpose()?
                .unwrap_or_else(|| "personas_fisicas".to_string()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Database name: {}", config.db_name);
        tracing::debug!("Search collections: {:?}", config.search_collections);
        if config.google_maps_api_key.is_some() {
            tracing::info!("Google Maps geocoding enabled: {}", config.google_maps_base_url);
        } else {
            tracing::info!("GOOGLE_MAPS_API_KEY not set, geocoding disabled");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Parses a comma separated collection list, rejecting names that are not
/// safe identifiers.
pub fn parse_collection_list(raw: &str) -> anyhow::Result<Vec<String>> {
    let mut collections = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !crate::db_storage::is_valid_identifier(name) {
            anyhow::bail!("SEARCH_COLLECTIONS contains invalid collection name '{}'", name);
        }
        if !collections.iter().any(|c: &String| c == name) {
            collections.push(name.to_string());
        }
    }
    if collections.is_empty() {
        anyhow::bail!("SEARCH_COLLECTIONS must name at least one collection");
    }
    Ok(collections)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_list_keeps_order_and_drops_duplicates() {
        let parsed = parse_collection_list(" personas_fisicas, personas_juridicas ,personas_fisicas")
            .unwrap();
        assert_eq!(parsed, vec!["personas_fisicas", "personas_juridicas"]);
    }

    #[test]
    fn collection_list_rejects_bad_names() {
        assert!(parse_collection_list("personas;drop").is_err());
        assert!(parse_collection_list(" , ").is_err());
        assert!(parse_collection_list("Personas").is_err());
    }
}
