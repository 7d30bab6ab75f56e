//! Stress test for filedrop: many concurrent uploads

use bytes::Bytes;
use filedrop::common::{Config, FileId};
use filedrop::FileService;
use futures_util::stream;
use std::collections::HashSet;
use std::time::Instant;
use tempfile::TempDir;

const UPLOADS: usize = 64;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn stress_concurrent_uploads() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let service = FileService::open(&config).unwrap();

    let start = Instant::now();
    let mut handles = Vec::with_capacity(UPLOADS);
    for i in 0..UPLOADS {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let chunks = vec![
                Ok::<_, std::io::Error>(Bytes::from(format!("upload {} ", i))),
                Ok(Bytes::from(vec![b'x'; i * 100])),
            ];
            service
                .ingest(&format!("file_{}.txt", i), Some("text/plain"), stream::iter(chunks))
                .await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let record = handle.await.unwrap().unwrap();
        assert!(ids.insert(record.id.clone()), "duplicate id {}", record.id);
    }
    println!("{} concurrent uploads: {:?}", UPLOADS, start.elapsed());

    assert_eq!(ids.len(), UPLOADS);
    assert_eq!(service.len(), UPLOADS);
    let before = service.list();
    drop(service);

    // Replay sees every upload, in the order the live index listed them
    let service = FileService::open(&config).unwrap();
    let after = service.list();
    assert_eq!(after, before);
    let replayed: HashSet<FileId> = after.iter().map(|r| r.id.clone()).collect();
    assert_eq!(replayed, ids);

    for record in &after {
        let retrieved = service.open_file(&record.id).await.unwrap();
        let i: usize = record
            .name
            .trim_start_matches("file_")
            .trim_end_matches(".txt")
            .parse()
            .unwrap();
        let expected = format!("upload {} ", i).len() + i * 100;
        assert_eq!(retrieved.size, expected as u64);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_reads_during_writes() {
    let dir = TempDir::new().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let service = FileService::open(&config).unwrap();

    let writer = {
        let service = service.clone();
        tokio::spawn(async move {
            for i in 0..UPLOADS {
                let chunks = vec![Ok::<_, std::io::Error>(Bytes::from_static(b"data"))];
                service
                    .ingest(&format!("w{}", i), None, stream::iter(chunks))
                    .await
                    .unwrap();
            }
        })
    };

    // Every listing is a prefix of the final one and never shrinks
    let mut last = 0;
    while !writer.is_finished() {
        let list = service.list();
        assert!(list.len() >= last);
        for (i, record) in list.iter().enumerate() {
            assert_eq!(record.name, format!("w{}", i));
        }
        last = list.len();
        tokio::task::yield_now().await;
    }
    writer.await.unwrap();
    assert_eq!(service.len(), UPLOADS);
}
