//! `update-symbols` - network-only refresh of the stock and ashare
//! symbol caches in one invocation.

use anyhow::Result;
use clap::Args;
use std::str::FromStr;
use tracing::info;

use datagrab_catalog::merge_filters;
use datagrab_types::AssetType;

use super::{AppContext, FilterArgs, CATALOG_REFRESH_TIMEOUT};

/// Refresh the cached symbol universes that have remote listings.
#[derive(Debug, Args)]
pub(crate) struct UpdateSymbolsArgs {
    /// Truncate each refreshed list to this many instruments
    #[arg(long)]
    pub limit: Option<usize>,

    /// Scope: comma-separated subset of stock,ashare
    #[arg(long = "asset-types", default_value = "stock,ashare")]
    pub asset_types: String,

    #[command(flatten)]
    pub filters: FilterArgs,
}

fn parse_scope(raw: &str) -> Vec<AssetType> {
    let mut scope: Vec<AssetType> = raw
        .split(',')
        .filter_map(|item| AssetType::from_str(item).ok())
        .filter(|at| matches!(at, AssetType::Stock | AssetType::Ashare))
        .collect();
    scope.dedup();
    if scope.is_empty() {
        scope = vec![AssetType::Stock, AssetType::Ashare];
    }
    scope
}

pub(crate) async fn run(ctx: &AppContext, args: &UpdateSymbolsArgs) -> Result<()> {
    let filters = merge_filters(&ctx.config.filters, Some(&args.filters.to_filter_config()));
    let limit = args.limit.or(Some(ctx.catalog.default_limit()));

    for asset_type in parse_scope(&args.asset_types) {
        ctx.router.set_asset_type(asset_type);
        let result = match tokio::time::timeout(
            CATALOG_REFRESH_TIMEOUT,
            ctx.catalog.get_catalog(asset_type, true, limit, Some(&filters)),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => anyhow::bail!("catalog refresh for {asset_type} timed out"),
        };
        info!(
            asset_type = %asset_type,
            count = result.items.len(),
            source = %result.source,
            "symbols refreshed"
        );
        println!(
            "{}: {} items refreshed -> {}",
            asset_type,
            result.items.len(),
            ctx.catalog.cache_path(asset_type).display()
        );
    }
    Ok(())
}
