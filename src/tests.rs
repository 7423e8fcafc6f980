use std::sync::Arc;

use image::ImageFormat;
use poem::http::{header, StatusCode};
use poem::test::{TestClient, TestResponse};
use poem::Endpoint;
use tempfile::TempDir;

use crate::auth::{SealedTokenVerifier, TokenPayload};
use crate::config::RuntimeConfig;
use crate::controller::Controller;
use crate::processor::fixtures;
use crate::storage::backends::BackendConfigs;
use crate::upload::UploadDescriptor;
use crate::{routes, utils};

const MEMORY_CONFIG: &str = include_str!("../tests/configs/memory.yaml");
const FILESYSTEM_CONFIG: &str = include_str!("../tests/configs/filesystem.yaml");
const TEST_KEY: [u8; 32] = [42; 32];
const BOUNDARY: &str = "breakpoint-test-boundary";

struct Environment<E> {
    app: TestClient<E>,
    fallback: Vec<u8>,
    dir: TempDir,
}

async fn setup_environment(
    cfg: &str,
    on_disk: bool,
) -> anyhow::Result<Environment<impl Endpoint>> {
    let dir = tempfile::tempdir()?;
    let mut cfg = RuntimeConfig::from_yaml(cfg)?;

    let fallback = fixtures::encoded(16, 16, ImageFormat::Jpeg);
    let fallback_path = dir.path().join("404.jpg");
    tokio::fs::write(&fallback_path, &fallback).await?;
    cfg.fallback_image = fallback_path;

    if on_disk {
        cfg.sources = BackendConfigs::FileSystem {
            directory: dir.path().join("files"),
        };
        cfg.cache = BackendConfigs::FileSystem {
            directory: dir.path().join("cache"),
        };
    }

    let controller = Controller::from_config(&cfg).await?;
    let app = TestClient::new(routes::router(Arc::new(controller)));

    Ok(Environment { app, fallback, dir })
}

fn upload_token(expires_in: i64) -> String {
    SealedTokenVerifier::from_key_bytes(&TEST_KEY)
        .unwrap()
        .seal(&TokenPayload { expires_in })
}

fn multipart_body(file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
            file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

async fn body_bytes(res: TestResponse) -> anyhow::Result<Vec<u8>> {
    Ok(res.0.into_body().into_vec().await?)
}

async fn upload<E: Endpoint>(
    app: &TestClient<E>,
    file_name: &str,
    data: &[u8],
    token: &str,
) -> TestResponse {
    app.post("/upload")
        .header(header::AUTHORIZATION, token)
        .content_type(format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(multipart_body(file_name, data))
        .send()
        .await
}

async fn upload_ok<E: Endpoint>(
    app: &TestClient<E>,
    width: u32,
    height: u32,
) -> anyhow::Result<(UploadDescriptor, String)> {
    let image = fixtures::encoded(width, height, ImageFormat::Jpeg);
    let token = upload_token(utils::now_epoch_secs() + 3600);

    let res = upload(app, "holiday.jpg", &image, &token).await;
    res.assert_status(StatusCode::OK);

    let descriptor: UploadDescriptor = serde_json::from_slice(&body_bytes(res).await?)?;
    let name = descriptor
        .link
        .strip_prefix("//images.test/")
        .map(ToString::to_string)
        .ok_or_else(|| anyhow::anyhow!("unexpected link {}", descriptor.link))?;

    Ok((descriptor, name))
}

#[tokio::test]
async fn test_index_serves_fallback() -> anyhow::Result<()> {
    let env = setup_environment(MEMORY_CONFIG, false).await?;

    let res = env.app.get("/").send().await;
    res.assert_status(StatusCode::NOT_FOUND);
    res.assert_content_type("image/jpeg");
    assert_eq!(body_bytes(res).await?, env.fallback);

    Ok(())
}

#[tokio::test]
async fn test_bad_requests_serve_fallback() -> anyhow::Result<()> {
    let env = setup_environment(MEMORY_CONFIG, false).await?;
    let (_, name) = upload_ok(&env.app, 800, 600).await?;

    for uri in [
        "/missing.jpg?w=400".to_string(),
        format!("/{}", name),
        format!("/{}?w=0", name),
        format!("/{}?w=-5", name),
        format!("/{}?w=wide", name),
        "/notes.txt?w=400".to_string(),
    ] {
        let res = env.app.get(&uri).send().await;
        res.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(body_bytes(res).await?, env.fallback, "uri {}", uri);
    }

    Ok(())
}

#[tokio::test]
async fn test_upload_then_retrieve() -> anyhow::Result<()> {
    let env = setup_environment(MEMORY_CONFIG, false).await?;
    let (descriptor, name) = upload_ok(&env.app, 1000, 700).await?;

    assert_eq!(descriptor.sizes, vec![320, 480, 768]);
    assert!(name.ends_with(".jpg"));

    let res = env.app.get(format!("/{}?w=500", name)).send().await;
    res.assert_status(StatusCode::OK);
    res.assert_content_type("image/jpeg");

    let data = body_bytes(res).await?;
    let resized = image::load_from_memory(&data)?;
    assert_eq!(resized.width(), 480);

    Ok(())
}

#[tokio::test]
async fn test_upload_rejections() -> anyhow::Result<()> {
    let env = setup_environment(MEMORY_CONFIG, false).await?;
    let image = fixtures::encoded(400, 300, ImageFormat::Jpeg);

    let expired = upload_token(utils::now_epoch_secs() - 10);
    let res = upload(&env.app, "a.jpg", &image, &expired).await;
    res.assert_status(StatusCode::FORBIDDEN);
    res.assert_text("403").await;

    let res = env
        .app
        .post("/upload")
        .content_type(format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(multipart_body("a.jpg", &image))
        .send()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_text("400").await;

    let valid = upload_token(utils::now_epoch_secs() + 3600);
    let res = env
        .app
        .post("/upload")
        .header(header::AUTHORIZATION, valid.as_str())
        .content_type("application/octet-stream")
        .body(image.clone())
        .send()
        .await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let res = upload(&env.app, "a.bmp", &image, &valid).await;
    res.assert_status(StatusCode::BAD_REQUEST);

    let res = env.app.get("/upload").send().await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_text("400").await;

    Ok(())
}

#[tokio::test]
async fn test_uploads_rejected_without_key() -> anyhow::Result<()> {
    let mut cfg = RuntimeConfig::from_yaml(MEMORY_CONFIG)?;
    cfg.auth.key = None;
    let yaml = serde_yaml::to_string(&cfg)?;

    let env = setup_environment(&yaml, false).await?;
    let image = fixtures::encoded(400, 300, ImageFormat::Jpeg);
    let token = upload_token(utils::now_epoch_secs() + 3600);

    let res = upload(&env.app, "a.jpg", &image, &token).await;
    res.assert_status(StatusCode::BAD_REQUEST);

    Ok(())
}

#[tokio::test]
async fn test_filesystem_variants_are_persisted() -> anyhow::Result<()> {
    let env = setup_environment(FILESYSTEM_CONFIG, true).await?;
    let (_, name) = upload_ok(&env.app, 1000, 700).await?;
    let uri = format!("/{}?w=768", name);

    let (first, second) = tokio::join!(env.app.get(&uri).send(), env.app.get(&uri).send());
    first.assert_status(StatusCode::OK);
    second.assert_status(StatusCode::OK);

    let first = body_bytes(first).await?;
    let second = body_bytes(second).await?;
    assert_eq!(first, second);

    let cached = env.dir.path().join("cache").join(format!("768_{}", name));
    assert!(cached.exists());
    assert_eq!(tokio::fs::read(&cached).await?, first);

    let res = env.app.get(&uri).send().await;
    res.assert_status(StatusCode::OK);
    assert_eq!(body_bytes(res).await?, first);

    Ok(())
}

#[tokio::test]
async fn test_oversized_requests_share_the_largest_breakpoint() -> anyhow::Result<()> {
    let env = setup_environment(FILESYSTEM_CONFIG, true).await?;
    let (_, name) = upload_ok(&env.app, 1000, 500).await?;

    let res = env.app.get(format!("/{}?w=5000", name)).send().await;
    res.assert_status(StatusCode::OK);
    let data = body_bytes(res).await?;

    let resized = image::load_from_memory(&data)?;
    assert_eq!(resized.width(), 1000);
    assert!(env
        .dir
        .path()
        .join("cache")
        .join(format!("1920_{}", name))
        .exists());

    Ok(())
}

#[tokio::test]
async fn test_huge_widths_serve_the_largest_breakpoint() -> anyhow::Result<()> {
    let env = setup_environment(MEMORY_CONFIG, false).await?;
    let (_, name) = upload_ok(&env.app, 1000, 500).await?;

    for width in ["99999999999", "99999999999999999999999"] {
        let res = env.app.get(format!("/{}?w={}", name, width)).send().await;
        res.assert_status(StatusCode::OK);
        res.assert_content_type("image/jpeg");

        let resized = image::load_from_memory(&body_bytes(res).await?)?;
        assert_eq!(resized.width(), 1000);
    }

    Ok(())
}

#[tokio::test]
async fn test_uploads_must_match_their_extension() -> anyhow::Result<()> {
    let env = setup_environment(MEMORY_CONFIG, false).await?;
    let token = upload_token(utils::now_epoch_secs() + 3600);
    let png = fixtures::encoded(1000, 700, ImageFormat::Png);

    let res = upload(&env.app, "holiday.jpg", &png, &token).await;
    res.assert_status(StatusCode::BAD_REQUEST);
    res.assert_text("400").await;

    let res = upload(&env.app, "holiday.png", &png, &token).await;
    res.assert_status(StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn test_content_type_is_stable_across_requests() -> anyhow::Result<()> {
    let env = setup_environment(FILESYSTEM_CONFIG, true).await?;

    // Placed directly in the source directory, bypassing upload checks.
    let bmp = fixtures::encoded(640, 480, ImageFormat::Bmp);
    tokio::fs::write(env.dir.path().join("files").join("legacy.png"), &bmp).await?;

    let mut served = Vec::new();
    for _ in 0..3 {
        let res = env.app.get("/legacy.png?w=500").send().await;
        res.assert_status(StatusCode::OK);
        res.assert_content_type("image/webp");
        served.push(body_bytes(res).await?);
    }

    assert_eq!(image::guess_format(&served[0])?, ImageFormat::WebP);
    assert!(served.iter().all(|data| data == &served[0]));

    Ok(())
}
