//! Open-world streaming demonstration
//!
//! This example shows:
//! - Terrain chunks requested around a moving camera
//! - A texture shared by every chunk, loaded once
//! - Idle eviction of chunks left behind
//! - Diagnostic events and stats
//!
//! Run with an optional config file:
//! `cargo run --example open_world -- stream.toml`

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use void_stream::prelude::*;
use void_stream::{EventQueue, StreamEvent};

const CHUNK_SIZE: usize = 32;

struct Texture {
    texels: Vec<u8>,
}

impl Asset for Texture {
    const TYPE_NAME: &'static str = "Texture";

    fn byte_size(&self) -> usize {
        self.texels.len()
    }
}

struct Chunk {
    heights: Vec<f32>,
    ground: Handle<Texture>,
}

impl Asset for Chunk {
    const TYPE_NAME: &'static str = "Chunk";

    fn byte_size(&self) -> usize {
        self.heights.len() * core::mem::size_of::<f32>()
    }
}

fn parse_chunk_key(key: &str) -> LoadResult<(i32, i32)> {
    let coords = key
        .strip_prefix("chunk_")
        .and_then(|rest| rest.split_once('_'))
        .ok_or_else(|| LoadError::UnsupportedFormat(key.to_string()))?;
    let x = coords.0.parse().map_err(|_| LoadError::Parse(key.to_string()))?;
    let z = coords.1.parse().map_err(|_| LoadError::Parse(key.to_string()))?;
    Ok((x, z))
}

fn generate_heights(cx: i32, cz: i32) -> Vec<f32> {
    (0..CHUNK_SIZE * CHUNK_SIZE)
        .map(|i| {
            let x = (cx * CHUNK_SIZE as i32 + (i % CHUNK_SIZE) as i32) as f32;
            let z = (cz * CHUNK_SIZE as i32 + (i / CHUNK_SIZE) as i32) as f32;
            (x * 0.05).sin() * (z * 0.05).cos() * 8.0
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => StreamingConfig::load(path)?,
        None => StreamingConfig::default()
            .with_idle_timeout(Some(Duration::from_millis(200)))
            .with_memory_budget(Some(64 * 1024)),
    };

    let events = Arc::new(EventQueue::new());
    let mut manager = StreamingManager::spawn(config)?.with_sink(events.clone())?;

    manager.register_fn(|_ctx, key| {
        thread::sleep(Duration::from_millis(10));
        log::debug!("Decoded texture {}", key);
        Ok(Texture {
            texels: vec![0x3c; 64 * 64 * 4],
        })
    })?;

    manager.register_fn(|ctx, key| {
        let (cx, cz) = parse_chunk_key(key)?;
        let ground = ctx.request::<Texture>("grass.png")?;
        thread::sleep(Duration::from_millis(5));
        Ok(Chunk {
            heights: generate_heights(cx, cz),
            ground,
        })
    })?;

    println!("Open World Streaming Demo");
    println!("=========================\n");

    // Camera walks east along z = 0, keeping a 3x3 ring of chunks requested
    let mut visible: Vec<Handle<Chunk>> = Vec::new();
    for step in 0..12 {
        let camera_x = step;
        visible.clear();
        for dx in -1..=1 {
            for dz in -1..=1 {
                let key = format!("chunk_{}_{}", camera_x + dx, dz);
                visible.push(manager.request(&key, LoadMode::Async)?);
            }
        }

        thread::sleep(Duration::from_millis(50));

        let ready = visible.iter().filter(|h| h.is_ready()).count();
        let peak = visible
            .iter()
            .filter_map(|h| h.retrieve())
            .map(|chunk| chunk.heights.iter().copied().fold(f32::MIN, f32::max))
            .fold(f32::MIN, f32::max);
        let report = manager.tick(Instant::now());

        println!(
            "step {:2}: {}/{} chunks ready, peak {:5.2}, evicted {} idle / {} budget, purged {}",
            step,
            ready,
            visible.len(),
            peak,
            report.idle_evicted,
            report.budget_evicted,
            report.purged
        );
    }

    // The ground texture is shared by every chunk
    if let Some(chunk) = visible.iter().find_map(|h| h.retrieve()) {
        println!(
            "\nground texture: {:?}, {} loads of it total",
            chunk.ground.state(),
            chunk.ground.generation()
        );
    }

    let mut failed = 0;
    let mut evicted = 0;
    for event in events.drain() {
        match event {
            StreamEvent::Failed { key, reason, .. } => {
                failed += 1;
                log::warn!("{} failed: {}", key, reason);
            }
            StreamEvent::Evicted { .. } => evicted += 1,
            _ => {}
        }
    }

    let stats = manager.stats();
    println!("\n{:#?}", stats);
    println!("{} evictions, {} failures", evicted, failed);

    manager.shutdown();
    Ok(())
}
