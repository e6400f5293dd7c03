use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pi_device_gateway::{
    camera::{frame::yuv420_to_rgb, CameraSession, Frame, FrameEncoding, TestPatternDevice},
    fanout::DropOldestQueue,
    gpio::PinState,
    metrics::{MetricSource, StaticSource, TelemetrySample},
    web::stream::mjpeg_part,
    ImageFormat, Resolution,
};
use std::sync::Arc;
use std::time::Duration;

const SIZES: [(u32, u32); 3] = [(320, 240), (640, 480), (1280, 720)];

fn gradient(width: u32, height: u32) -> Frame {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]);
        }
    }
    Frame::new(data, width, height, FrameEncoding::Rgb8)
}

/// Benchmark JPEG and PNG encoding of RGB frames
fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for (width, height) in SIZES {
        let frame = gradient(width, height);
        let label = format!("{}x{}", width, height);

        group.bench_with_input(BenchmarkId::new("jpeg_q80", &label), &frame, |b, frame| {
            b.iter(|| frame.encode(ImageFormat::Jpeg, 80).expect("Should encode jpeg"))
        });
        group.bench_with_input(BenchmarkId::new("png", &label), &frame, |b, frame| {
            b.iter(|| frame.encode(ImageFormat::Png, 80).expect("Should encode png"))
        });
    }

    group.finish();
}

/// Benchmark YUV420 to RGB conversion of raw sensor frames
fn bench_yuv_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("yuv420_to_rgb");

    for (width, height) in SIZES {
        let yuv = vec![128u8; (width * height * 3 / 2) as usize];
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", width, height)),
            &yuv,
            |b, yuv| b.iter(|| yuv420_to_rgb(yuv, width, height)),
        );
    }

    group.finish();
}

/// Benchmark publishing one frame to many subscriber queues
fn bench_queue_publish(c: &mut Criterion) {
    let frame = Arc::new(vec![0u8; 40_000]);

    for subscribers in [1usize, 4, 16, 64] {
        let queues: Vec<_> = (0..subscribers).map(|_| DropOldestQueue::new(4)).collect();
        c.bench_with_input(
            BenchmarkId::new("queue_publish", subscribers),
            &queues,
            |b, queues| {
                b.iter(|| {
                    for queue in queues {
                        queue.push(frame.clone());
                    }
                })
            },
        );
    }
}

/// Benchmark wrapping a JPEG as an MJPEG part
fn bench_mjpeg_part(c: &mut Criterion) {
    let jpeg = gradient(640, 480)
        .encode(ImageFormat::Jpeg, 80)
        .expect("Should encode jpeg");

    c.bench_function("mjpeg_part", |b| b.iter(|| mjpeg_part(&jpeg)));
}

/// Benchmark still capture through the session with the synthetic device
fn bench_still_capture(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let session = CameraSession::new(
        Box::new(TestPatternDevice::new(Resolution::new(640, 480))),
        Duration::from_secs(2),
        80,
    );

    c.bench_function("still_capture_jpeg", |b| {
        b.to_async(&rt).iter(|| async {
            session
                .capture_still(ImageFormat::Jpeg)
                .await
                .expect("Should capture still")
        })
    });
}

/// Benchmark telemetry sample JSON serialization for WebSocket messages
fn bench_sample_serialization(c: &mut Criterion) {
    let mut source = StaticSource::healthy();
    let sample = TelemetrySample::from_readings(source.sample(), PinState { pin: 17, level: true });

    c.bench_function("sample_json_serialization", |b| {
        b.iter(|| serde_json::to_string(&sample).expect("Should serialize"))
    });
}

criterion_group!(
    benches,
    bench_frame_encoding,
    bench_yuv_conversion,
    bench_queue_publish,
    bench_mjpeg_part,
    bench_still_capture,
    bench_sample_serialization
);
criterion_main!(benches);
