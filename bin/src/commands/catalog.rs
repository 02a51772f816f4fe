//! `catalog` - fetch or load an instrument universe.

use anyhow::{bail, Result};
use clap::Args;
use std::str::FromStr;
use tracing::{info, warn};

use datagrab_catalog::merge_filters;
use datagrab_types::AssetType;

use super::{AppContext, FilterArgs, CATALOG_REFRESH_TIMEOUT};

/// Download and cache the symbol list for an asset class.
#[derive(Debug, Args)]
pub(crate) struct CatalogArgs {
    /// Asset type: stock, ashare, forex, crypto, commodity
    #[arg(long = "asset-type", default_value = "stock")]
    pub asset_type: String,

    /// Fetch the latest list from the remote endpoint instead of the
    /// local cache
    #[arg(long)]
    pub refresh: bool,

    /// With --refresh, update every remotely-fetchable asset type
    #[arg(long = "refresh-all", requires = "refresh")]
    pub refresh_all: bool,

    /// Truncate the result to this many instruments
    #[arg(long)]
    pub limit: Option<usize>,

    #[command(flatten)]
    pub filters: FilterArgs,
}

pub(crate) async fn run(ctx: &AppContext, args: &CatalogArgs) -> Result<()> {
    let filters = merge_filters(&ctx.config.filters, Some(&args.filters.to_filter_config()));
    let limit = args.limit.or(Some(ctx.catalog.default_limit()));

    if args.refresh_all {
        for asset_type in [AssetType::Stock, AssetType::Ashare] {
            ctx.router.set_asset_type(asset_type);
            let fetched = tokio::time::timeout(
                CATALOG_REFRESH_TIMEOUT,
                ctx.catalog.get_catalog(asset_type, true, limit, Some(&filters)),
            )
            .await;
            match fetched {
                Ok(Ok(result)) => info!(
                    asset_type = %asset_type,
                    source = %result.source,
                    count = result.items.len(),
                    total = result.total_count,
                    cache = %ctx.catalog.cache_path(asset_type).display(),
                    "catalog refreshed"
                ),
                Ok(Err(e)) => warn!(asset_type = %asset_type, error = %e, "catalog refresh failed"),
                Err(_) => warn!(asset_type = %asset_type, "catalog refresh timed out"),
            }
        }
        return Ok(());
    }

    let asset_type = AssetType::from_str(&args.asset_type)?;
    ctx.router.set_asset_type(asset_type);
    let result = match tokio::time::timeout(
        CATALOG_REFRESH_TIMEOUT,
        ctx.catalog
            .get_catalog(asset_type, args.refresh, limit, Some(&filters)),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => bail!("catalog refresh for {asset_type} timed out"),
    };

    info!(
        asset_type = %asset_type,
        source = %result.source,
        count = result.items.len(),
        total = result.total_count,
        cache = %ctx.catalog.cache_path(asset_type).display(),
        "catalog loaded"
    );
    println!(
        "{}: {} instruments ({}, {} before limit) -> {}",
        asset_type,
        result.items.len(),
        result.source,
        result.total_count,
        ctx.catalog.cache_path(asset_type).display()
    );
    Ok(())
}
