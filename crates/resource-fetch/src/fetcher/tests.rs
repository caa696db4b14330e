use super::*;
use crate::builder::FetcherConfigBuilder;
use crate::cache::CacheConfig;
use crate::error::RefusalReason;
use crate::http::ResourceRequest;
use crate::resource::ResourceStatus;
use crate::test_utils::{
    ClientEvent, RecordingClient, TestEnv, as_client, http_date, request, response, url,
};
use crate::variants::{
    FontLoadLimitState, FontResource, FontResourceFactory, ImageResourceFactory, MimeTypeCheck,
    RawResource, RawResourceFactory, ScriptResource, ScriptResourceFactory, StyleSheetResource,
    StyleSheetResourceFactory,
};
use std::time::Duration;

const SHEET: &str = "https://example.com/site.css";
const SCRIPT: &str = "https://example.com/app.js";
const DATA: &str = "https://example.com/data.json";

/// `sha256` of `alert(1);`.
const ALERT_INTEGRITY: &str = "sha256-5jFwrAK0UV47oFbVg/iCCBbxD8X1w+QvoOUepu4C2YA=";

fn fetch_sheet(env: &TestEnv, client: Option<&Rc<RecordingClient>>) -> Resource {
    env.fetcher
        .request_resource(request(SHEET), &StyleSheetResourceFactory, client.map(as_client))
        .unwrap()
}

/// Complete the most recent load of `target` as a CSS response.
fn complete_sheet(env: &TestEnv, target: &str, headers: &[(&str, &str)], body: &'static [u8]) {
    let mut all = vec![("Content-Type", "text/css")];
    all.extend_from_slice(headers);
    env.transport
        .load_for(target)
        .unwrap()
        .complete(response(target, 200, &all), body);
    env.run();
}

#[test]
fn test_concurrent_requests_share_one_load() {
    crate::init_test_tracing!();
    let env = TestEnv::new();
    let first_client = RecordingClient::new("first");
    let second_client = RecordingClient::new("second");

    let first = fetch_sheet(&env, Some(&first_client));
    let second = fetch_sheet(&env, Some(&second_client));
    assert!(first.ptr_eq(&second));
    assert_eq!(env.transport.load_count(), 1);
    assert_eq!(env.fetcher.loader_count(), 1);

    complete_sheet(&env, SHEET, &[], b"a{}");
    assert_eq!(first_client.finished_count(), 1);
    assert_eq!(second_client.finished_count(), 1);
    assert_eq!(env.context.loaded_count(), 1);
    assert!(!env.fetcher.is_fetching());

    let stats = env.fetcher.fetch_stats();
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.uses, 1);
    assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn test_raw_requests_are_not_grouped() {
    let env = TestEnv::new();
    let first = env
        .fetcher
        .request_resource(request(DATA), &RawResourceFactory::default(), None)
        .unwrap();
    let second = env
        .fetcher
        .request_resource(request(DATA), &RawResourceFactory::default(), None)
        .unwrap();

    assert!(!first.ptr_eq(&second));
    assert_eq!(env.transport.load_count(), 2);
    assert!(!env.cache.contains(&first));
    assert!(env.cache.contains(&second));
    assert_eq!(env.fetcher.fetch_stats().reloads, 1);
}

#[test]
fn test_raw_reuse_ignores_listed_headers() {
    let env = TestEnv::new();
    env.context.set_load_complete(true);
    let first = env
        .fetcher
        .request_resource(request(DATA), &RawResourceFactory::default(), None)
        .unwrap();
    let date = http_date(env.now());
    env.transport.last_load().unwrap().complete(
        response(DATA, 200, &[("Date", date.as_str()), ("Cache-Control", "max-age=600")]),
        b"{}",
    );
    env.run();

    let mut with_referer = request(DATA);
    with_referer
        .resource_request_mut()
        .set_header("Referer", "https://example.com/");
    let reused = env
        .fetcher
        .request_resource(with_referer, &RawResourceFactory::default(), None)
        .unwrap();
    assert!(reused.ptr_eq(&first));

    let mut with_custom = request(DATA);
    with_custom
        .resource_request_mut()
        .set_header("X-Requested-With", "fetch");
    let reloaded = env
        .fetcher
        .request_resource(with_custom, &RawResourceFactory::default(), None)
        .unwrap();
    assert!(!reloaded.ptr_eq(&first));
    assert_eq!(env.transport.load_count(), 2);
}

#[test]
fn test_main_resources_are_never_shared() {
    let env = TestEnv::new();
    let target = "https://example.com/";
    let first = env
        .fetcher
        .request_resource(request(target), &RawResourceFactory::main_resource(), None)
        .unwrap();
    let second = env
        .fetcher
        .request_resource(request(target), &RawResourceFactory::main_resource(), None)
        .unwrap();

    assert!(!first.ptr_eq(&second));
    assert_eq!(env.transport.load_count(), 2);
    assert!(env.cache.is_empty());
}

#[test]
fn test_fresh_response_is_reused_until_stale() {
    let env = TestEnv::new();
    env.context.set_load_complete(true);
    let first = fetch_sheet(&env, None);
    let date = http_date(env.now());
    complete_sheet(
        &env,
        SHEET,
        &[("Date", date.as_str()), ("Cache-Control", "max-age=3600")],
        b"a{}",
    );

    env.advance(Duration::from_secs(500));
    let fresh = fetch_sheet(&env, None);
    assert!(fresh.ptr_eq(&first));
    assert_eq!(env.transport.load_count(), 1);

    env.advance(Duration::from_secs(3200));
    let stale = fetch_sheet(&env, None);
    assert!(!stale.ptr_eq(&first));
    assert_eq!(env.transport.load_count(), 2);

    let stats = env.fetcher.fetch_stats();
    assert_eq!(stats.uses, 1);
    assert_eq!(stats.reloads, 1);
    assert_eq!(stats.dead_resource_uses, 1);
}

#[test]
fn test_stale_resource_with_validator_is_revalidated() {
    let env = TestEnv::new();
    env.context.set_load_complete(true);
    let first = fetch_sheet(&env, None);
    let date = http_date(env.now());
    complete_sheet(
        &env,
        SHEET,
        &[
            ("Date", date.as_str()),
            ("Cache-Control", "max-age=60"),
            ("ETag", "\"v1\""),
        ],
        b"a{}",
    );

    env.advance(Duration::from_secs(120));
    let client = RecordingClient::new("late");
    let second = fetch_sheet(&env, Some(&client));
    assert!(second.ptr_eq(&first));
    assert!(second.is_cache_validator());
    assert_eq!(env.fetcher.fetch_stats().revalidations, 1);

    let load = env.transport.last_load().unwrap();
    assert_eq!(load.request().header_str("if-none-match"), Some("\"v1\""));
    // Observers wait for the revalidation outcome.
    assert_eq!(client.finished_count(), 0);

    load.complete(response(SHEET, 304, &[("Cache-Control", "max-age=60")]), b"");
    env.run();
    assert!(!second.is_cache_validator());
    assert_eq!(second.status(), ResourceStatus::Cached);
    assert_eq!(client.finished_count(), 1);
    assert!(!second.resource_request().is_conditional());

    let sheet = StyleSheetResource::from_resource(second).unwrap();
    assert_eq!(&*sheet.sheet_text(MimeTypeCheck::Strict).unwrap(), "a{}");
}

#[test]
fn test_validate_cache_mode_forces_revalidation() {
    let env = TestEnv::new();
    env.context.set_load_complete(true);
    let first = fetch_sheet(&env, None);
    let date = http_date(env.now());
    complete_sheet(
        &env,
        SHEET,
        &[
            ("Date", date.as_str()),
            ("Cache-Control", "max-age=3600"),
            ("Last-Modified", "Tue, 30 Apr 2024 12:00:00 GMT"),
        ],
        b"a{}",
    );

    env.context.set_cache_mode(CacheMode::ValidateCache);
    let second = fetch_sheet(&env, None);
    assert!(second.ptr_eq(&first));

    let load = env.transport.last_load().unwrap();
    assert_eq!(
        load.request().header_str("if-modified-since"),
        Some("Tue, 30 Apr 2024 12:00:00 GMT")
    );
    assert_eq!(load.request().header_str("cache-control"), Some("max-age=0"));
}

#[test]
fn test_stale_resource_without_validator_reloads() {
    let env = TestEnv::new();
    env.context.set_load_complete(true);
    let first = fetch_sheet(&env, None);
    let date = http_date(env.now());
    complete_sheet(
        &env,
        SHEET,
        &[("Date", date.as_str()), ("Cache-Control", "max-age=60")],
        b"a{}",
    );

    env.advance(Duration::from_secs(120));
    let second = fetch_sheet(&env, None);
    assert!(!second.ptr_eq(&first));
    assert!(!second.is_cache_validator());
}

/// Cache a stale sheet carrying `ETag: "v1"` and start revalidating it.
fn revalidating_sheet(env: &TestEnv, client: &Rc<RecordingClient>) -> Resource {
    env.context.set_load_complete(true);
    fetch_sheet(env, None);
    let date = http_date(env.now());
    complete_sheet(
        env,
        SHEET,
        &[
            ("Date", date.as_str()),
            ("Cache-Control", "max-age=60"),
            ("ETag", "\"v1\""),
        ],
        b"a{}",
    );
    env.advance(Duration::from_secs(120));
    let sheet = fetch_sheet(env, Some(client));
    assert!(sheet.is_cache_validator());
    sheet
}

#[test]
fn test_redirect_during_revalidation_drops_validators() {
    let env = TestEnv::new();
    let client = RecordingClient::new("sheet");
    let sheet = revalidating_sheet(&env, &client);

    let load = env.transport.last_load().unwrap();
    let moved = "https://cdn.example.com/site.css";
    load.redirect(moved, response(SHEET, 301, &[("Location", moved)]));
    env.run();

    assert!(!sheet.is_cache_validator());
    assert!(sheet.data().is_none());
    assert!(!sheet.resource_request().is_conditional());
    let chain = sheet.redirect_chain();
    assert_eq!(chain.len(), 1);
    assert!(chain[0].request.header_str("if-none-match").is_none());

    // The hop carried no validators, so a 304 fails the load.
    load.complete(response(moved, 304, &[]), b"");
    env.run();
    assert_eq!(sheet.status(), ResourceStatus::LoadError);
    assert!(env.fetcher.memory_cache().lookup(&url(SHEET), "").is_none());
    assert_eq!(client.finished_count(), 1);
}

#[test]
fn test_failed_revalidation_restores_the_request() {
    let env = TestEnv::new();
    let client = RecordingClient::new("sheet");
    let sheet = revalidating_sheet(&env, &client);

    let load = env.transport.last_load().unwrap();
    assert_eq!(load.request().header_str("if-none-match"), Some("\"v1\""));
    load.complete(
        response(SHEET, 200, &[("Content-Type", "text/css"), ("Cache-Control", "max-age=60")]),
        b"b{}",
    );
    env.run();

    assert_eq!(sheet.status(), ResourceStatus::Cached);
    assert!(!sheet.resource_request().is_conditional());
    assert!(sheet.resource_request().header_str("if-none-match").is_none());
    let sheet = StyleSheetResource::from_resource(sheet).unwrap();
    assert_eq!(&*sheet.sheet_text(MimeTypeCheck::Strict).unwrap(), "b{}");
}

#[test]
fn test_raw_observer_during_revalidation_gets_cached_body() {
    let env = TestEnv::new();
    env.context.set_load_complete(true);
    let first = RawResource::fetch(request(DATA), &env.fetcher, RawResourceFactory::default(), None)
        .unwrap();
    let date = http_date(env.now());
    env.transport.last_load().unwrap().complete(
        response(
            DATA,
            200,
            &[
                ("Date", date.as_str()),
                ("Cache-Control", "max-age=60"),
                ("ETag", "\"d1\""),
            ],
        ),
        b"payload",
    );
    env.run();

    env.advance(Duration::from_secs(120));
    let client = RecordingClient::new("late");
    let second = RawResource::fetch(
        request(DATA),
        &env.fetcher,
        RawResourceFactory::default(),
        Some(as_client(&client)),
    )
    .unwrap();
    assert!(second.ptr_eq(&first));
    assert!(second.is_cache_validator());
    assert!(client.events().is_empty());

    env.transport
        .last_load()
        .unwrap()
        .complete(response(DATA, 304, &[("Cache-Control", "max-age=60")]), b"");
    env.run();

    assert_eq!(second.status(), ResourceStatus::Cached);
    assert_eq!(&second.body()[..], b"payload");
    assert_eq!(
        client.events(),
        vec![ClientEvent::Response(200), ClientEvent::Data(7), ClientEvent::Finished]
    );
}

#[test]
fn test_cache_modes_on_the_request() {
    let env = TestEnv::new();
    env.context.set_load_complete(true);
    let first = fetch_sheet(&env, None);
    let date = http_date(env.now());
    complete_sheet(
        &env,
        SHEET,
        &[("Date", date.as_str()), ("Cache-Control", "max-age=60")],
        b"a{}",
    );
    env.advance(Duration::from_secs(120));

    let with_mode = |mode| FetchRequest::new(ResourceRequest::new(url(SHEET)).with_cache_mode(mode));

    let stale_ok = with_mode(CacheMode::ReturnCacheDataElseLoad);
    let served = env
        .fetcher
        .request_resource(stale_ok, &StyleSheetResourceFactory, None)
        .unwrap();
    assert!(served.ptr_eq(&first));

    let reloaded = env
        .fetcher
        .request_resource(with_mode(CacheMode::BypassCache), &StyleSheetResourceFactory, None)
        .unwrap();
    assert!(!reloaded.ptr_eq(&first));
}

#[test]
fn test_vary_star_is_never_reused() {
    let env = TestEnv::new();
    let first = fetch_sheet(&env, None);
    complete_sheet(&env, SHEET, &[("Vary", "*")], b"a{}");

    let second = fetch_sheet(&env, None);
    assert!(!second.ptr_eq(&first));
    assert_eq!(env.transport.load_count(), 2);
}

#[test]
fn test_vary_on_request_header() {
    let env = TestEnv::new();
    let english = || {
        let mut fetch = request(SHEET);
        fetch.resource_request_mut().set_header("Accept-Language", "en");
        fetch
    };
    let first = env
        .fetcher
        .request_resource(english(), &StyleSheetResourceFactory, None)
        .unwrap();
    complete_sheet(&env, SHEET, &[("Vary", "Accept-Language")], b"a{}");

    let same = env
        .fetcher
        .request_resource(english(), &StyleSheetResourceFactory, None)
        .unwrap();
    assert!(same.ptr_eq(&first));

    let mut french = request(SHEET);
    french.resource_request_mut().set_header("Accept-Language", "fr");
    let other = env
        .fetcher
        .request_resource(french, &StyleSheetResourceFactory, None)
        .unwrap();
    assert!(!other.ptr_eq(&first));
}

#[test]
fn test_other_type_for_same_url_reloads() {
    let env = TestEnv::new();
    let target = "https://example.com/shared";
    let script = env
        .fetcher
        .request_resource(request(target), &ScriptResourceFactory, None)
        .unwrap();
    let sheet = env
        .fetcher
        .request_resource(request(target), &StyleSheetResourceFactory, None)
        .unwrap();

    assert!(!sheet.ptr_eq(&script));
    assert_eq!(sheet.resource_type(), ResourceType::StyleSheet);
    assert!(env.cache.contains(&sheet));
    assert!(!env.cache.contains(&script));
}

#[test]
fn test_document_resources_survive_a_cache_swap() {
    let env = TestEnv::new();
    let first = fetch_sheet(&env, None);
    complete_sheet(&env, SHEET, &[], b"a{}");

    let fresh_cache = MemoryCache::new(CacheConfig::default(), env.scheduler.clone());
    let previous = env.fetcher.replace_memory_cache_for_testing(fresh_cache.clone());
    assert!(previous.contains(&first));
    assert!(env.fetcher.document_resource(&url(SHEET)).is_some());

    let second = fetch_sheet(&env, None);
    assert!(second.ptr_eq(&first));
    assert!(fresh_cache.is_empty());
}

#[test]
fn test_released_document_resources_are_forgotten() {
    let env = TestEnv::new();
    let first = fetch_sheet(&env, None);
    complete_sheet(&env, SHEET, &[], b"a{}");
    assert_eq!(env.fetcher.document_resource_count(), 1);

    env.fetcher.memory_cache().evict_resources();
    drop(first);
    assert!(env.fetcher.document_resource(&url(SHEET)).is_none());

    let script = env
        .fetcher
        .request_resource(request(SCRIPT), &ScriptResourceFactory, None)
        .unwrap();
    assert_eq!(env.fetcher.document_resource_count(), 1);
    assert!(env.fetcher.document_resource(&url(SCRIPT)).is_some_and(|r| r.ptr_eq(&script)));
}

#[test]
fn test_data_url_is_served_without_a_load() {
    let env = TestEnv::new();
    let target = "data:text/css,a%7Bcolor:red%7D";
    let client = RecordingClient::new("sheet");
    let resource = env
        .fetcher
        .request_resource(request(target), &StyleSheetResourceFactory, Some(as_client(&client)))
        .unwrap();

    assert_eq!(env.transport.load_count(), 0);
    assert_eq!(resource.status(), ResourceStatus::Cached);
    assert_eq!(client.finished_count(), 1);
    let sheet = StyleSheetResource::from_resource(resource.clone()).unwrap();
    assert_eq!(&*sheet.sheet_text(MimeTypeCheck::Strict).unwrap(), "a{color:red}");

    let again = env
        .fetcher
        .request_resource(request(target), &StyleSheetResourceFactory, None)
        .unwrap();
    assert!(again.ptr_eq(&resource));
    let stats = env.fetcher.fetch_stats();
    assert_eq!(stats.static_data, 1);
    assert_eq!(stats.uses, 1);
}

#[test]
fn test_raw_data_url_replays_to_observer() {
    let env = TestEnv::new();
    let client = RecordingClient::new("raw");
    env.fetcher
        .request_resource(
            request("data:text/plain;base64,aGVsbG8="),
            &RawResourceFactory::default(),
            Some(as_client(&client)),
        )
        .unwrap();
    assert!(client.events().is_empty());

    env.run();
    assert_eq!(
        client.events(),
        vec![ClientEvent::Response(200), ClientEvent::Data(5), ClientEvent::Finished]
    );
}

#[test]
fn test_invalid_data_url_is_refused() {
    let env = TestEnv::new();
    let result = env.fetcher.request_resource(
        request("data:text/plain;base64,!!!"),
        &RawResourceFactory::default(),
        None,
    );
    assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    assert_eq!(env.fetcher.fetch_stats().refused, 1);
}

#[test]
fn test_http_error_fails_typed_resources() {
    let env = TestEnv::new();
    let client = RecordingClient::new("script");
    let script = ScriptResource::fetch(request(SCRIPT), &env.fetcher, Some(as_client(&client))).unwrap();
    let load = env.transport.last_load().unwrap();
    load.complete(response(SCRIPT, 404, &[("Content-Type", "text/javascript")]), b"nope");
    env.run();

    assert!(load.is_cancelled());
    assert_eq!(script.status(), ResourceStatus::LoadError);
    assert!(matches!(
        script.resource_error(),
        Some(ResourceError::HttpStatus { status, .. }) if status.as_u16() == 404
    ));
    assert!(matches!(script.source_text(), Err(RefusalReason::LoadFailed)));
    assert_eq!(client.events(), vec![ClientEvent::Finished]);
    assert!(!env.cache.contains(script.resource()));
}

#[test]
fn test_http_error_is_a_response_for_raw() {
    let env = TestEnv::new();
    let client = RecordingClient::new("raw");
    let raw = RawResource::fetch(
        request(DATA),
        &env.fetcher,
        RawResourceFactory::default(),
        Some(as_client(&client)),
    )
    .unwrap();
    env.transport
        .last_load()
        .unwrap()
        .complete(response(DATA, 404, &[]), b"missing");
    env.run();

    assert_eq!(raw.status(), ResourceStatus::Cached);
    assert_eq!(&raw.body()[..], b"missing");
    assert_eq!(
        client.events(),
        vec![ClientEvent::Response(404), ClientEvent::Data(7), ClientEvent::Finished]
    );
}

#[test]
fn test_integrity_checked_on_finish() {
    let env = TestEnv::new();
    let passing = ScriptResource::fetch(
        request(SCRIPT).with_integrity(ALERT_INTEGRITY),
        &env.fetcher,
        None,
    )
    .unwrap();
    env.transport.last_load().unwrap().complete(
        response(SCRIPT, 200, &[("Content-Type", "text/javascript")]),
        b"alert(1);",
    );
    env.run();
    assert_eq!(&*passing.source_text().unwrap(), "alert(1);");

    let other = "https://example.com/other.js";
    let failing = ScriptResource::fetch(request(other).with_integrity(ALERT_INTEGRITY), &env.fetcher, None)
        .unwrap();
    env.transport.last_load().unwrap().complete(
        response(other, 200, &[("Content-Type", "text/javascript")]),
        b"alert(2);",
    );
    env.run();
    assert!(matches!(failing.source_text(), Err(RefusalReason::Integrity)));
    // The refusal is scoped to the typed accessor.
    assert_eq!(failing.data().as_deref(), Some(&b"alert(2);"[..]));
}

#[test]
fn test_different_integrity_metadata_reloads() {
    let env = TestEnv::new();
    let first = env
        .fetcher
        .request_resource(
            request(SCRIPT).with_integrity(ALERT_INTEGRITY),
            &ScriptResourceFactory,
            None,
        )
        .unwrap();
    let second = env
        .fetcher
        .request_resource(
            request(SCRIPT).with_integrity("sha384-abcdef"),
            &ScriptResourceFactory,
            None,
        )
        .unwrap();
    assert!(!second.ptr_eq(&first));
}

#[test]
fn test_priority_is_raised_but_never_lowered() {
    let env = TestEnv::new();
    let target = "https://example.com/hero.png";
    let image = env
        .fetcher
        .request_resource(
            request(target).with_priority(ResourceLoadPriority::Low),
            &ImageResourceFactory::default(),
            None,
        )
        .unwrap();
    let load = env.transport.last_load().unwrap();
    assert_eq!(load.request().priority(), ResourceLoadPriority::Low);

    env.fetcher
        .request_resource(
            request(target).with_priority(ResourceLoadPriority::High),
            &ImageResourceFactory::default(),
            None,
        )
        .unwrap();
    assert_eq!(image.priority(), ResourceLoadPriority::High);
    assert_eq!(load.priority(), Some(ResourceLoadPriority::High));

    env.fetcher
        .request_resource(
            request(target).with_priority(ResourceLoadPriority::VeryLow),
            &ImageResourceFactory::default(),
            None,
        )
        .unwrap();
    assert_eq!(image.priority(), ResourceLoadPriority::High);
}

#[test]
fn test_new_request_uses_default_priority() {
    let env = TestEnv::with_config(
        FetcherConfigBuilder::new()
            .with_default_priority(ResourceLoadPriority::VeryHigh)
            .build(),
    );
    let fetch = env.fetcher.new_request(url(SCRIPT));
    assert_eq!(fetch.priority(), ResourceLoadPriority::VeryHigh);
    assert!(matches!(
        ResourceFetcher::parse_url("not a url"),
        Err(FetchError::InvalidUrl(_))
    ));
}

#[test]
fn test_blocking_loader_counts() {
    let env = TestEnv::new();
    env.fetcher
        .request_resource(request(SCRIPT), &ScriptResourceFactory, None)
        .unwrap();
    env.fetcher
        .request_resource(
            request("https://example.com/movie.mp4"),
            &RawResourceFactory::media(),
            None,
        )
        .unwrap();

    assert_eq!(env.fetcher.loader_count(), 2);
    assert_eq!(env.fetcher.blocking_loader_count(), 1);
    assert_eq!(env.fetcher.non_blocking_loader_count(), 1);
}

#[test]
fn test_link_preload_is_claimed_by_real_request() {
    let env = TestEnv::new();
    let preload = env
        .fetcher
        .request_resource(request(SCRIPT).with_link_preload(true), &ScriptResourceFactory, None)
        .unwrap();
    assert!(preload.is_preloaded());
    assert_eq!(env.fetcher.blocking_loader_count(), 0);
    assert_eq!(env.fetcher.warn_unused_preloads(), vec![url(SCRIPT)]);
    assert_eq!(env.fetcher.preload_stats().never_referenced, 1);

    let client = RecordingClient::new("parser");
    let claimed = env
        .fetcher
        .request_resource(request(SCRIPT), &ScriptResourceFactory, Some(as_client(&client)))
        .unwrap();
    assert!(claimed.ptr_eq(&preload));
    assert!(!claimed.is_preloaded());
    assert_eq!(claimed.preload_result(), PreloadResult::ReferencedWhileLoading);
    assert_eq!(env.transport.load_count(), 1);
    assert_eq!(env.fetcher.blocking_loader_count(), 1);
    assert!(env.fetcher.preloads().is_empty());
    assert!(env.fetcher.warn_unused_preloads().is_empty());

    let stats = env.fetcher.preload_stats();
    assert_eq!(stats.total, 1);
    assert_eq!(stats.referenced_before_completion, 1);
    assert_eq!(stats.never_referenced, 0);
    assert_eq!(stats.misses, 0);

    env.transport.last_load().unwrap().complete(
        response(SCRIPT, 200, &[("Content-Type", "text/javascript")]),
        b"run();",
    );
    env.run();
    assert_eq!(client.finished_count(), 1);
}

#[test]
fn test_preload_from_another_fetcher_counts_a_miss() {
    let env = TestEnv::new();
    env.fetcher
        .request_resource(request(SCRIPT).with_for_preload(true), &ScriptResourceFactory, None)
        .unwrap();

    let other = ResourceFetcher::new(
        FetcherConfig::default(),
        Rc::new(DefaultFetchContext::new()),
        env.cache.clone(),
        env.transport.clone(),
    );
    other
        .request_resource(request(SCRIPT), &ScriptResourceFactory, None)
        .unwrap();

    assert_eq!(other.preload_stats().misses, 1);
    assert_eq!(env.fetcher.preloads().len(), 1);
    assert_eq!(env.transport.load_count(), 1);
}

#[test]
fn test_clear_preloads() {
    let env = TestEnv::new();
    let link = env
        .fetcher
        .request_resource(request(SCRIPT).with_link_preload(true), &ScriptResourceFactory, None)
        .unwrap();
    let speculative = env
        .fetcher
        .request_resource(request(SHEET).with_for_preload(true), &StyleSheetResourceFactory, None)
        .unwrap();
    assert_eq!(env.fetcher.preloads().len(), 2);

    env.fetcher
        .clear_preloads(ClearPreloadsPolicy::ClearSpeculativeMarkupPreloads);
    let remaining = env.fetcher.preloads();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].ptr_eq(&link));
    assert!(!env.cache.contains(&speculative));
    assert!(env.cache.contains(&link));

    let stats = env.fetcher.preload_stats();
    assert_eq!(stats.total, 2);
    assert_eq!(stats.never_referenced, 2);

    env.fetcher.clear_preloads(ClearPreloadsPolicy::ClearAllPreloads);
    assert!(env.fetcher.preloads().is_empty());
    assert!(!env.cache.contains(&link));
    assert_eq!(env.fetcher.preload_stats().never_referenced, 2);
}

#[test]
fn test_fonts_wait_until_needed() {
    let env = TestEnv::new();
    let target = "https://example.com/font.woff2";
    let client = RecordingClient::new("text");
    let font = FontResource::fetch(
        request(target),
        &env.fetcher,
        &FontResourceFactory::default(),
        Some(as_client(&client)),
    )
    .unwrap();
    assert_eq!(env.transport.load_count(), 0);
    assert!(font.resource().still_needs_load());

    font.begin_load_if_needed(&env.fetcher);
    font.begin_load_if_needed(&env.fetcher);
    assert_eq!(env.transport.load_count(), 1);
    assert_eq!(font.load_limit_state(), FontLoadLimitState::UnderLimit);

    env.advance(Duration::from_millis(100));
    env.run();
    assert_eq!(font.load_limit_state(), FontLoadLimitState::ShortLimitExceeded);

    env.advance(Duration::from_millis(2900));
    env.run();
    assert_eq!(font.load_limit_state(), FontLoadLimitState::LongLimitExceeded);

    env.transport
        .last_load()
        .unwrap()
        .complete(response(target, 200, &[("Content-Type", "font/woff2")]), b"wOF2");
    env.run();
    assert_eq!(
        client.events(),
        vec![
            ClientEvent::FontShortLimit,
            ClientEvent::FontLongLimit,
            ClientEvent::Finished
        ]
    );
    assert!(font.font_data().is_ok());
}

#[test]
fn test_font_limits_stop_when_load_finishes() {
    let env = TestEnv::new();
    let target = "https://example.com/font.woff2";
    let client = RecordingClient::new("text");
    FontResource::fetch(
        request(target).with_for_preload(true),
        &env.fetcher,
        &FontResourceFactory::default(),
        Some(as_client(&client)),
    )
    .unwrap();
    assert_eq!(env.transport.load_count(), 1);

    env.transport
        .last_load()
        .unwrap()
        .complete(response(target, 200, &[]), b"wOF2");
    env.run();
    env.advance(Duration::from_secs(5));
    env.run();
    assert_eq!(client.events(), vec![ClientEvent::Finished]);
}

#[test]
fn test_redirect_to_blocked_host_fails_access_check() {
    let env = TestEnv::new();
    env.context.block_host("ads.example.net");
    let client = RecordingClient::new("script");
    let script = env
        .fetcher
        .request_resource(request(SCRIPT), &ScriptResourceFactory, Some(as_client(&client)))
        .unwrap();

    let load = env.transport.last_load().unwrap();
    let blocked = "https://ads.example.net/track.js";
    load.redirect(blocked, response(SCRIPT, 302, &[("Location", blocked)]));
    env.run();

    assert!(load.is_cancelled());
    assert!(script.resource_error().is_some_and(|e| e.is_access_check()));
    assert_eq!(client.finished_count(), 1);
    assert_eq!(env.fetcher.loader_count(), 0);
}

#[test]
fn test_blocked_request_is_refused() {
    let env = TestEnv::new();
    env.context.block_host("ads.example.net");
    let result = env.fetcher.request_resource(
        request("https://ads.example.net/track.js"),
        &ScriptResourceFactory,
        None,
    );

    assert!(matches!(result, Err(FetchError::Blocked { .. })));
    assert_eq!(env.transport.load_count(), 0);
    assert!(env.cache.is_empty());
    assert_eq!(env.fetcher.fetch_stats().refused, 1);
}

#[test]
fn test_redirect_limit() {
    let env = TestEnv::with_config(FetcherConfigBuilder::new().with_max_redirects(1).build());
    let client = RecordingClient::new("raw");
    let raw = env
        .fetcher
        .request_resource(request(DATA), &RawResourceFactory::default(), Some(as_client(&client)))
        .unwrap();

    let load = env.transport.last_load().unwrap();
    let hop = "https://example.com/hop.json";
    load.redirect(hop, response(DATA, 302, &[("Location", hop)]));
    load.redirect(DATA, response(hop, 302, &[("Location", DATA)]));
    env.run();

    assert!(matches!(raw.resource_error(), Some(ResourceError::Network { .. })));
    assert_eq!(raw.redirect_chain().len(), 1);
    assert_eq!(
        client.events(),
        vec![ClientEvent::Redirect(hop.to_string()), ClientEvent::Finished]
    );
}

#[test]
fn test_refused_load_leaves_cache() {
    let env = TestEnv::new();
    env.context.set_refuse_new_loads(true);
    let result = env
        .fetcher
        .request_resource(request(SCRIPT), &ScriptResourceFactory, None);

    assert!(matches!(result, Err(FetchError::LoadNotStarted(_))));
    assert!(env.cache.is_empty());
    assert_eq!(env.transport.load_count(), 0);
}

#[test]
fn test_stop_fetching_cancels_every_load() {
    let env = TestEnv::new();
    let script_client = RecordingClient::new("script");
    let raw_client = RecordingClient::new("raw");
    let script = env
        .fetcher
        .request_resource(request(SCRIPT), &ScriptResourceFactory, Some(as_client(&script_client)))
        .unwrap();
    let raw = env
        .fetcher
        .request_resource(request(DATA), &RawResourceFactory::default(), Some(as_client(&raw_client)))
        .unwrap();

    env.fetcher.stop_fetching();
    assert!(!env.fetcher.is_fetching());
    assert!(env.transport.loads().iter().all(|load| load.is_cancelled()));
    for resource in [&script, &raw] {
        assert!(resource.resource_error().is_some_and(|e| e.is_cancellation()));
        assert!(!env.cache.contains(resource));
    }
    assert_eq!(script_client.finished_count(), 1);
    assert_eq!(raw_client.finished_count(), 1);
}

#[test]
fn test_detach_refuses_later_requests() {
    let env = TestEnv::new();
    env.fetcher
        .request_resource(request(SCRIPT).with_link_preload(true), &ScriptResourceFactory, None)
        .unwrap();
    let load = env.transport.last_load().unwrap();

    env.fetcher.detach();
    assert!(env.fetcher.is_detached());
    assert!(env.fetcher.context().is_none());
    assert!(load.is_cancelled());
    assert!(env.fetcher.preloads().is_empty());

    let result = env
        .fetcher
        .request_resource(request(SHEET), &StyleSheetResourceFactory, None);
    assert!(matches!(result, Err(FetchError::Detached)));
    let stats = env.fetcher.fetch_stats();
    assert_eq!(stats.requests, 2);
    assert_eq!(stats.refused, 1);
}

#[test]
fn test_detached_context_stops_new_loads() {
    let env = TestEnv::new();
    let resource = env.new_resource(&ScriptResourceFactory, SCRIPT);
    env.context.set_detached(true);

    assert!(env.fetcher.is_detached());
    assert!(!env.fetcher.start_load(&resource));
    assert_eq!(env.transport.load_count(), 0);
}

#[test]
fn test_validated_url_limit() {
    let env = TestEnv::with_config(FetcherConfigBuilder::new().with_validated_url_limit(1).build());
    let first = fetch_sheet(&env, None);
    env.fetcher
        .request_resource(request(SCRIPT), &ScriptResourceFactory, None)
        .unwrap();
    complete_sheet(&env, SHEET, &[("Cache-Control", "no-cache")], b"a{}");

    // The sheet was forgotten when the script was remembered, so the
    // no-cache response has to be loaded again.
    let second = fetch_sheet(&env, None);
    assert!(!second.ptr_eq(&first));
}

#[tokio::test]
async fn test_run_until_complete_drains_loads() {
    let env = TestEnv::new();
    let client = RecordingClient::new("sheet");
    fetch_sheet(&env, Some(&client));
    env.transport
        .last_load()
        .unwrap()
        .complete(response(SHEET, 200, &[("Content-Type", "text/css")]), b"a{}");

    env.fetcher.run_until_complete().await;
    assert_eq!(env.fetcher.loader_count(), 0);
    assert_eq!(client.finished_count(), 1);
}
