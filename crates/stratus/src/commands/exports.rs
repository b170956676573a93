use stratus_cloud::{ManifestStore, ResourceKind, StateStore};
use stratus_config::ResolvedConfiguration;

pub async fn handle(config: &ResolvedConfiguration, kind: ResourceKind) -> anyhow::Result<()> {
    let manifests = ManifestStore::for_store(&StateStore::from_config(config));
    let manifest = manifests.read(kind).await?.ok_or_else(|| {
        anyhow::anyhow!(
            "no exports for {} at {}; run `stratus provision {}` first",
            kind,
            manifests.path(kind).display(),
            kind
        )
    })?;

    print!("{}", manifest.render());
    Ok(())
}
