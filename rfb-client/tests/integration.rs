//! End-to-end snapshot runs against a scripted in-process RFB server.

use pretty_assertions::assert_eq;
use rfb_client::encodings::LinkInfo;
use rfb_client::{run_over, BlankPolicy, Config, MemorySink, RfbClientError};
use rfb_protocol::messages::types::{ENCODING_COPYRECT, ENCODING_RAW};
use rfb_protocol::messages::{FramebufferUpdateHeader, Rectangle};
use rfb_protocol::RfbOutStream;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

const WIDTH: u16 = 4;
const HEIGHT: u16 = 3;

/// One FramebufferUpdateRequest as the server saw it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Request {
    incremental: bool,
    x: u16,
    y: u16,
    width: u16,
    height: u16,
}

fn server_init() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&WIDTH.to_be_bytes());
    bytes.extend_from_slice(&HEIGHT.to_be_bytes());
    // 32bpp, depth 24, little-endian, true colour, red/green/blue at 0/8/16.
    bytes.extend_from_slice(&[32, 24, 0, 1, 0, 255, 0, 255, 0, 255, 0, 8, 16, 0, 0, 0]);
    bytes.extend_from_slice(&4u32.to_be_bytes());
    bytes.extend_from_slice(b"fake");
    bytes
}

async fn frame(rects: &[(Rectangle, Vec<u8>)]) -> Vec<u8> {
    let mut out = RfbOutStream::new(Vec::new());
    FramebufferUpdateHeader {
        num_rectangles: rects.len() as u16,
    }
    .write_to(&mut out);
    for (rect, payload) in rects {
        rect.write_to(&mut out);
        out.write_bytes(payload);
    }
    out.flush().await.unwrap();
    out.into_inner()
}

fn raw_fill(x: u16, y: u16, width: u16, height: u16, rgb: [u8; 3]) -> (Rectangle, Vec<u8>) {
    let pixels = (0..width as usize * height as usize)
        .flat_map(|_| [rgb[0], rgb[1], rgb[2], 0])
        .collect();
    (
        Rectangle {
            x,
            y,
            width,
            height,
            encoding: ENCODING_RAW,
        },
        pixels,
    )
}

/// RFB 3.8 server without authentication. Answers each update request with
/// the next frame and reports every request it received. With no frames it
/// hangs up straight after reading SetEncodings.
async fn scripted_server(mut server: DuplexStream, frames: Vec<Vec<u8>>) -> Vec<Request> {
    let hang_up = frames.is_empty();
    server.write_all(b"RFB 003.008\n").await.unwrap();
    let mut version = [0u8; 12];
    server.read_exact(&mut version).await.unwrap();
    server.write_all(&[1, 1]).await.unwrap();
    let mut chosen = [0u8; 1];
    server.read_exact(&mut chosen).await.unwrap();
    assert_eq!(chosen[0], 1);
    server.write_all(&0u32.to_be_bytes()).await.unwrap();
    let mut shared = [0u8; 1];
    server.read_exact(&mut shared).await.unwrap();
    server.write_all(&server_init()).await.unwrap();

    let mut set_pixel_format = [0u8; 20];
    server.read_exact(&mut set_pixel_format).await.unwrap();
    assert_eq!(set_pixel_format[0], 0);

    let mut set_encodings = [0u8; 4];
    server.read_exact(&mut set_encodings).await.unwrap();
    assert_eq!(set_encodings[0], 2);
    let count = u16::from_be_bytes([set_encodings[2], set_encodings[3]]) as usize;
    let mut encodings = vec![0u8; count * 4];
    server.read_exact(&mut encodings).await.unwrap();

    let mut requests = Vec::new();
    for body in frames {
        let mut req = [0u8; 10];
        server.read_exact(&mut req).await.unwrap();
        assert_eq!(req[0], 3);
        requests.push(Request {
            incremental: req[1] != 0,
            x: u16::from_be_bytes([req[2], req[3]]),
            y: u16::from_be_bytes([req[4], req[5]]),
            width: u16::from_be_bytes([req[6], req[7]]),
            height: u16::from_be_bytes([req[8], req[9]]),
        });
        server.write_all(&body).await.unwrap();
    }

    if !hang_up {
        // Hold the connection open until the client hangs up.
        let mut rest = Vec::new();
        let _ = server.read_to_end(&mut rest).await;
    }
    requests
}

async fn snapshot(
    config: &Config,
    frames: Vec<Vec<u8>>,
) -> (Result<rfb_client::SnapshotReport, RfbClientError>, MemorySink, Vec<Request>) {
    let (client, server) = duplex(64 * 1024);
    let task = tokio::spawn(scripted_server(server, frames));
    let (reader, writer) = tokio::io::split(client);
    let mut sink = MemorySink::default();
    let result = run_over(reader, writer, LinkInfo::default(), config, &mut sink).await;
    (result, sink, task.await.unwrap())
}

fn base_config() -> rfb_client::ConfigBuilder {
    Config::builder()
        .host("fakehost")
        .null_password(true)
        .output("shot.jpg")
}

#[tokio::test]
async fn test_single_capture_of_whole_screen() {
    let config = base_config().build().unwrap();
    let frames = vec![frame(&[raw_fill(0, 0, WIDTH, HEIGHT, [10, 20, 30])]).await];

    let (result, sink, requests) = snapshot(&config, frames).await;
    let report = result.unwrap();

    assert_eq!(report.files, vec!["shot.jpg"]);
    assert_eq!(report.screen, (WIDTH, HEIGHT));
    assert_eq!(report.desktop_name, "fake");
    assert_eq!(sink.images.len(), 1);
    let image = &sink.images[0];
    assert_eq!((image.width, image.height, image.quality), (4, 3, 100));
    assert_eq!(&image.rgb[..6], &[10, 20, 30, 10, 20, 30]);
    assert_eq!(
        requests,
        vec![Request {
            incremental: false,
            x: 0,
            y: 0,
            width: WIDTH,
            height: HEIGHT
        }]
    );
}

#[tokio::test]
async fn test_blank_first_frame_is_rerequested() {
    let config = base_config().build().unwrap();
    let frames = vec![
        frame(&[raw_fill(0, 0, WIDTH, HEIGHT, [0, 0, 0])]).await,
        frame(&[raw_fill(1, 1, 1, 1, [200, 100, 50])]).await,
    ];

    let (result, sink, requests) = snapshot(&config, frames).await;
    result.unwrap();

    assert_eq!(requests.len(), 2);
    assert!(!requests[0].incremental);
    assert!(requests[1].incremental);
    // Pixel (1, 1) of a 4-wide image.
    let offset = (WIDTH as usize + 1) * 3;
    assert_eq!(&sink.images[0].rgb[offset..offset + 3], &[200, 100, 50]);
}

#[tokio::test]
async fn test_blank_frame_kept_when_allowed() {
    let config = base_config().blank(BlankPolicy::Allow).build().unwrap();
    let frames = vec![frame(&[raw_fill(0, 0, WIDTH, HEIGHT, [0, 0, 0])]).await];

    let (result, sink, requests) = snapshot(&config, frames).await;
    result.unwrap();

    assert_eq!(requests.len(), 1);
    assert!(sink.images[0].rgb.iter().all(|&b| b == 0));
}

#[tokio::test(start_paused = true)]
async fn test_series_of_cropped_captures() {
    let config = base_config()
        .rect("2x2-0-0")
        .count(2)
        .interval_secs(30)
        .save_quality(80)
        .build()
        .unwrap();
    let copy = Rectangle {
        x: 2,
        y: 1,
        width: 2,
        height: 2,
        encoding: ENCODING_COPYRECT,
    };
    let frames = vec![
        frame(&[
            raw_fill(0, 0, WIDTH, HEIGHT, [1, 1, 1]),
            raw_fill(0, 0, 2, 2, [9, 8, 7]),
        ]).await,
        // Second capture: copy the top-left block onto the captured area.
        frame(&[(copy, vec![0, 0, 0, 0])]).await,
    ];

    let (result, sink, requests) = snapshot(&config, frames).await;
    let report = result.unwrap();

    assert_eq!(report.files, vec!["shot00000.jpg", "shot00001.jpg"]);
    let expected_request = Request {
        incremental: false,
        x: 2,
        y: 1,
        width: 2,
        height: 2,
    };
    assert_eq!(requests, vec![expected_request, expected_request]);

    assert_eq!(sink.images[0].rgb, [1u8; 12].to_vec());
    assert_eq!(sink.images[0].quality, 80);
    assert_eq!(sink.images[1].rgb, [9u8, 8, 7].repeat(4));
}

#[tokio::test]
async fn test_server_hangup_mid_capture() {
    let config = base_config().build().unwrap();
    let (result, sink, _) = snapshot(&config, Vec::new()).await;

    let err = result.unwrap_err();
    assert!(err.is_disconnect(), "unexpected error {:?}", err);
    assert!(sink.images.is_empty());
}
