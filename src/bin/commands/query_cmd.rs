use anyhow::{Context, Result};
use geoipd::{Database, GeoIpService, IpRequest, Method, QueryError};
use serde_json::json;
use std::sync::Arc;

use crate::{DatabaseArgs, QueryKind};

pub fn cmd_query(
    db: &DatabaseArgs,
    kind: QueryKind,
    ip: String,
    language: String,
    quiet: bool,
) -> Result<()> {
    let path = db.resolve()?;
    let database = Database::open(&path)
        .with_context(|| format!("Failed to load database: {}", path.display()))?;
    let service = GeoIpService::new(Arc::new(database)).with_language(language);

    let result = match kind {
        QueryKind::Country => call(&service, Method::QueryCountry, &ip),
        QueryKind::City => call(&service, Method::QueryCity, &ip),
        QueryKind::Subdivision => call(&service, Method::QuerySubdivision, &ip),
        QueryKind::All => service.lookup(&ip).map(|geo| {
            serde_json::to_string_pretty(&json!({
                "ip": ip,
                "country": geo.country_iso_code,
                "city": geo.city_name,
                "subdivision": geo.subdivision_name,
            }))
            .unwrap_or_default()
        }),
    };

    match result {
        Ok(output) => {
            if !quiet {
                println!("{}", output);
            }
            std::process::exit(0);
        }
        Err(e) => {
            if !quiet {
                eprintln!("{} ({})", e, e.code());
            }
            std::process::exit(1);
        }
    }
}

fn call(service: &GeoIpService, method: Method, ip: &str) -> Result<String, QueryError> {
    service
        .call(method, &IpRequest::new(ip))
        .map(|response| response.name)
}
