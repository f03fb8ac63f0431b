//! Store-backed cache population and invalidation

use tsmeta_common::{
    Compression, DataType, Encoding, MeasurementSchema, MetaStoreConfig, PartialPath,
    SchemaCacheConfig, TimeValuePair, TsValue,
};
use tsmeta_meta_store::MetadataStore;
use tsmeta_schema_cache::{SchemaCache, SchemaComputation};

fn p(s: &str) -> PartialPath {
    PartialPath::parse(s).unwrap()
}

fn setup(dir: &tempfile::TempDir) -> (MetadataStore, SchemaCache) {
    let store = MetadataStore::open(MetaStoreConfig::with_data_dir(dir.path())).unwrap();
    store.declare_storage_group(&p("root.sg")).unwrap();
    for name in ["s1", "s2", "s3"] {
        store
            .create_measurement(
                &p(&format!("root.sg.d1.{name}")),
                DataType::Int64,
                Encoding::Ts2Diff,
                Compression::Snappy,
                None,
                None,
            )
            .unwrap();
    }
    let cache = SchemaCache::new(&SchemaCacheConfig::default());
    (store, cache)
}

#[derive(Default)]
struct Collected {
    aligned: Option<bool>,
    types: Vec<(usize, DataType)>,
}

impl SchemaComputation for Collected {
    fn compute_device(&mut self, aligned: bool) {
        self.aligned = Some(aligned);
    }

    fn compute_measurement(&mut self, index: usize, _name: &str, schema: &MeasurementSchema) {
        self.types.push((index, schema.data_type));
    }
}

#[test]
fn test_fill_misses_from_store() {
    let dir = tempfile::tempdir().unwrap();
    let (store, cache) = setup(&dir);
    let device = p("root.sg.d1");
    let batch: Vec<String> = ["s1", "s2", "s3"].iter().map(|s| (*s).to_string()).collect();

    let mut first = Collected::default();
    let missing = cache.compute(&device, &batch, &mut first);
    assert_eq!(missing, vec![0, 1, 2]);
    assert_eq!(first.aligned, None);

    for index in missing {
        let path = device.concat_node(&batch[index]).unwrap();
        cache.put(store.fetch_schema(&path).unwrap());
    }

    let mut second = Collected::default();
    assert!(cache.compute(&device, &batch, &mut second).is_empty());
    assert_eq!(second.aligned, Some(false));
    assert_eq!(second.types.len(), 3);
    assert!(second.types.iter().all(|(_, t)| *t == DataType::Int64));
}

#[test]
fn test_invalidate_after_delete() {
    let dir = tempfile::tempdir().unwrap();
    let (store, cache) = setup(&dir);
    cache.put(store.fetch_schema(&p("root.sg.**")).unwrap());
    assert_eq!(cache.estimated_entry_count(), 3);

    let pattern = p("root.sg.d1.s2");
    let deleted = store.delete_measurements(&pattern).unwrap();
    assert_eq!(deleted, vec![pattern.clone()]);
    assert_eq!(cache.invalidate_matching(&pattern), 1);
    assert!(cache.lookup_single(&pattern).is_empty());

    store.delete_storage_groups(&[p("root.sg")]).unwrap();
    assert_eq!(cache.invalidate_storage_group(&p("root.sg")), 2);
    assert_eq!(cache.estimated_entry_count(), 0);
}

#[test]
fn test_last_value_on_store_entry() {
    let dir = tempfile::tempdir().unwrap();
    let (store, cache) = setup(&dir);
    let entry = store.get_measurement(&p("root.sg.d1.s1")).unwrap();

    let pair = TimeValuePair::new(1_000, TsValue::Int64(42));
    cache.update_last_value_or_create(&entry, pair.clone(), false, Some(900));
    assert_eq!(cache.get_last_value(&entry.path), Some(pair));

    let tree = cache.lookup_single(&entry.path);
    assert_eq!(tree.storage_group_of(&entry.path), Some(&p("root.sg")));
}
