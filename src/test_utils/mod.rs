pub(crate) mod ingest_stub;
