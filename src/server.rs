// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP 控制面 + MJPEG 推流
//!
//! 控制器调用可能阻塞 (停止最多等待停止超时, 推流等待下一帧),
//! 一律放到 `web::block` 中执行.

use crate::controller::{
    multipart_chunk, CounterController, StartOutcome, StopOutcome, STREAM_CONTENT_TYPE,
};
use actix_web::http::{header, Method, StatusCode};
use actix_web::middleware::DefaultHeaders;
use actix_web::web::{self, Bytes};
use actix_web::{App, HttpResponse, HttpServer, Resource};
use async_stream::stream;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// 计数线更新请求, 缺省字段取默认值
#[derive(Debug, Deserialize)]
pub struct LineUpdate {
    #[serde(default = "default_position")]
    pub position: i64,
    #[serde(default)]
    pub angle: i64,
}

fn default_position() -> i64 {
    50
}

/// 带 OPTIONS 预检的资源
fn resource(path: &str) -> Resource {
    web::resource(path).route(web::method(Method::OPTIONS).to(preflight))
}

/// 注册全部路由
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(resource("/start/").route(web::post().to(start)))
        .service(resource("/stop/").route(web::post().to(stop)))
        .service(resource("/update_line/").route(web::post().to(update_line)))
        .service(resource("/start_counting/").route(web::post().to(start_counting)))
        .service(resource("/count/").route(web::get().to(count)))
        .service(resource("/video_feed/").route(web::get().to(video_feed)));
}

/// 前端跨域访问
pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
}

/// 运行 HTTP 服务直到进程收到停止信号
pub async fn serve(controller: Arc<CounterController>, bind: &str, port: u16) -> std::io::Result<()> {
    let data = web::Data::from(controller);
    info!("🌐 HTTP 服务监听 {}:{}", bind, port);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(cors_headers())
            .configure(routes)
    })
    .bind((bind, port))?
    .run()
    .await
}

fn status_body(code: StatusCode, status: &str) -> HttpResponse {
    HttpResponse::build(code).json(json!({ "status": status }))
}

fn error_body(message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::InternalServerError().json(json!({
        "status": "error",
        "message": message.to_string(),
    }))
}

async fn start(state: web::Data<CounterController>) -> HttpResponse {
    let controller = state.into_inner();
    match web::block(move || controller.start()).await {
        Ok(Ok(StartOutcome::Started)) | Ok(Ok(StartOutcome::AlreadyRunning)) => {
            status_body(StatusCode::OK, "started")
        }
        Ok(Err(e)) => error_body(e),
        Err(e) => error_body(e),
    }
}

async fn stop(state: web::Data<CounterController>) -> HttpResponse {
    let controller = state.into_inner();
    let outcome = match web::block(move || controller.stop()).await {
        Ok(outcome) => outcome,
        Err(e) => StopOutcome::Failed(e.to_string()),
    };
    match &outcome {
        StopOutcome::Stopped => status_body(StatusCode::OK, outcome.status()),
        StopOutcome::AlreadyStopped => status_body(StatusCode::BAD_REQUEST, outcome.status()),
        StopOutcome::InProgress => status_body(StatusCode::TOO_MANY_REQUESTS, outcome.status()),
        StopOutcome::Failed(message) => error_body(message),
    }
}

async fn update_line(
    state: web::Data<CounterController>,
    body: web::Json<LineUpdate>,
) -> HttpResponse {
    state.set_line(body.position, body.angle);
    status_body(StatusCode::OK, "updated")
}

async fn start_counting(state: web::Data<CounterController>) -> HttpResponse {
    state.begin_counting();
    status_body(StatusCode::OK, "counting_started")
}

async fn count(state: web::Data<CounterController>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "count": state.get_count() }))
}

async fn video_feed(state: web::Data<CounterController>) -> HttpResponse {
    let frames = state.stream();
    let body = stream! {
        loop {
            let next = frames.clone();
            match web::block(move || next.next_frame()).await {
                Ok(Some(jpeg)) => yield Ok::<Bytes, actix_web::Error>(Bytes::from(multipart_chunk(&jpeg))),
                Ok(None) => break,
                Err(e) => {
                    warn!("⚠️ 推流中断: {}", e);
                    break;
                }
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .content_type(STREAM_CONTENT_TYPE)
        .streaming(body)
}

async fn preflight() -> HttpResponse {
    HttpResponse::NoContent().finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CounterConfig;
    use crate::controller::EngineFactory;
    use crate::detection::PersonDetector;
    use crate::engine::PreviewSink;
    use crate::input::FrameSource;
    use crate::pipeline::ReleaseHandle;
    use actix_web::test;

    /// 视频源打不开: 工作线程启动后立即退出
    struct UnavailableCamera;

    impl EngineFactory for UnavailableCamera {
        fn open_source(&self, _release: ReleaseHandle) -> anyhow::Result<Box<dyn FrameSource>> {
            anyhow::bail!("no camera")
        }

        fn load_detector(&self) -> anyhow::Result<Box<dyn PersonDetector>> {
            anyhow::bail!("no model")
        }

        fn open_preview(
            &self,
            _release: ReleaseHandle,
        ) -> anyhow::Result<Option<Box<dyn PreviewSink>>> {
            Ok(None)
        }
    }

    /// 空白画面, 画面中没有人
    struct IdleCamera;

    impl FrameSource for IdleCamera {
        fn read(&mut self) -> anyhow::Result<Option<image::RgbImage>> {
            std::thread::sleep(std::time::Duration::from_millis(5));
            Ok(Some(image::RgbImage::new(64, 48)))
        }
    }

    struct NoPeople;

    impl PersonDetector for NoPeople {
        fn detect(
            &mut self,
            _image: &image::RgbImage,
        ) -> anyhow::Result<Vec<crate::counting::Detection>> {
            Ok(Vec::new())
        }
    }

    struct IdleFactory;

    impl EngineFactory for IdleFactory {
        fn open_source(&self, _release: ReleaseHandle) -> anyhow::Result<Box<dyn FrameSource>> {
            Ok(Box::new(IdleCamera))
        }

        fn load_detector(&self) -> anyhow::Result<Box<dyn PersonDetector>> {
            Ok(Box::new(NoPeople))
        }

        fn open_preview(
            &self,
            _release: ReleaseHandle,
        ) -> anyhow::Result<Option<Box<dyn PreviewSink>>> {
            Ok(None)
        }
    }

    fn controller() -> web::Data<CounterController> {
        let controller = CounterController::new(&CounterConfig::default(), Arc::new(UnavailableCamera));
        web::Data::new(controller)
    }

    fn idle_controller() -> web::Data<CounterController> {
        let controller = CounterController::new(&CounterConfig::default(), Arc::new(IdleFactory));
        web::Data::new(controller)
    }

    #[actix_web::test]
    async fn count_is_zero_before_any_run() {
        let app = test::init_service(App::new().app_data(controller()).configure(routes)).await;
        let req = test::TestRequest::get().uri("/count/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, json!({ "count": 0 }));
    }

    #[actix_web::test]
    async fn stopping_idle_counter_is_bad_request() {
        let app = test::init_service(App::new().app_data(controller()).configure(routes)).await;
        let req = test::TestRequest::post().uri("/stop/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "already_stopped");
    }

    #[actix_web::test]
    async fn line_update_accepts_partial_body() {
        let app = test::init_service(App::new().app_data(controller()).configure(routes)).await;
        let req = test::TestRequest::post()
            .uri("/update_line/")
            .set_json(json!({ "angle": 90 }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "updated");
    }

    #[actix_web::test]
    async fn start_then_stop_round_trip() {
        let app = test::init_service(App::new().app_data(idle_controller()).configure(routes)).await;

        let req = test::TestRequest::post().uri("/start/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "started");

        let req = test::TestRequest::post().uri("/stop/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::post().uri("/stop/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn stopping_worker_that_failed_to_open_is_bad_request() {
        let data = controller();
        let app = test::init_service(App::new().app_data(data.clone()).configure(routes)).await;

        let req = test::TestRequest::post().uri("/start/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "started");

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while data.is_running() && std::time::Instant::now() < deadline {
            actix_web::rt::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(!data.is_running());

        let req = test::TestRequest::post().uri("/stop/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "already_stopped");
    }

    #[actix_web::test]
    async fn video_feed_disables_caching() {
        let app = test::init_service(App::new().app_data(controller()).configure(routes)).await;
        let req = test::TestRequest::get().uri("/video_feed/").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let headers = resp.headers();
        assert_eq!(headers.get(header::CACHE_CONTROL).unwrap().to_str().unwrap(), "no-cache");
        assert_eq!(
            headers.get(header::CONTENT_TYPE).unwrap().to_str().unwrap(),
            STREAM_CONTENT_TYPE
        );
    }

    #[actix_web::test]
    async fn preflight_is_answered_with_cors_headers() {
        let app = test::init_service(
            App::new()
                .app_data(controller())
                .wrap(cors_headers())
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/update_line/")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let origin = resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap();
        assert_eq!(origin.to_str().unwrap(), "*");
    }
}
