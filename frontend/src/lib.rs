use seed::{prelude::*, virtual_dom::AtValue, *};
use serde::{de::DeserializeOwned, Deserialize};
use serde_wasm_bindgen::to_value;
use shared::{
    eta::format_clock,
    playback::{FrameScheduler, PlaybackEngine, RenderSink},
    ApiError, Coordinate, EtaRequest, EtaResponse, Location, Route, RouteRequest, RouteResponse,
    SearchResponse,
};
use wasm_bindgen::{
    prelude::{wasm_bindgen, JsValue},
    JsCast,
};

#[wasm_bindgen(module = "/leaflet_map.js")]
extern "C" {
    #[wasm_bindgen(js_name = initMap)]
    fn init_map();
    #[wasm_bindgen(js_name = updateRoute)]
    fn update_route_js(coords: JsValue);
    #[wasm_bindgen(js_name = clearRoute)]
    fn clear_route_js();
    #[wasm_bindgen(js_name = updateSelectionMarkers)]
    fn update_selection_markers(start: JsValue, end: JsValue);
    #[wasm_bindgen(js_name = updateVehiclePosition)]
    fn update_vehicle_position(lat: f64, lon: f64, heading_degrees: f64);
    #[wasm_bindgen(js_name = focusLocation)]
    fn focus_location(lat: f64, lon: f64);
}

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = performance, js_name = now)]
    fn performance_now() -> f64;
}

const SEARCH_DEBOUNCE_MS: u32 = 300;
const MIN_SEARCH_CHARS: usize = 3;
const FRAME_INTERVAL_MS: u32 = 16;
const DEFAULT_SPEED_KMH: &str = "40";
const SPEED_RANGE_KMH: (f64, f64) = (5.0, 120.0);
const PLAYBACK_SPEEDS: [u32; 6] = [1, 2, 5, 10, 20, 50];

fn api_root() -> String {
    if let Some(url) = option_env!("FRONTEND_API_ROOT") {
        return url.trim_end_matches('/').to_string();
    }
    "/api".to_string()
}

pub struct Model {
    form: RouteForm,
    click_mode: Endpoint,
    search_debounce: Option<(Endpoint, CmdHandle)>,
    pending: bool,
    /// Bumped whenever an endpoint changes so late route responses are dropped.
    route_generation: u32,
    route_info: Option<RouteInfo>,
    engine: PlaybackEngine<fn() -> f64, StreamHandle>,
    readout: Readout,
    error: Option<String>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    Start,
    End,
}

impl Endpoint {
    fn label(self) -> &'static str {
        match self {
            Endpoint::Start => "Start",
            Endpoint::End => "Destination",
        }
    }
}

#[derive(Clone, Debug)]
struct RouteInfo {
    distance_m: f64,
    eta: EtaResponse,
}

#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
struct Readout {
    percent: u8,
    elapsed_seconds: u64,
}

#[derive(Default, Clone, Debug)]
struct EndpointInput {
    query: String,
    coordinate: Option<Coordinate>,
    suggestions: Vec<Location>,
}

impl EndpointInput {
    /// Typed text. A `lat, lon` pair selects that point directly.
    fn set_query(&mut self, query: String) {
        self.coordinate = parse_lat_lon(&query);
        self.query = query;
        self.suggestions.clear();
    }

    fn set_location(&mut self, coordinate: Coordinate, label: String) {
        self.coordinate = Some(coordinate);
        self.query = label;
        self.suggestions.clear();
    }

    /// The text to geocode, if it is long enough and not already a coordinate.
    fn search_query(&self) -> Option<String> {
        let query = self.query.trim();
        if self.coordinate.is_some() || query.chars().count() < MIN_SEARCH_CHARS {
            return None;
        }
        Some(query.to_string())
    }
}

#[derive(Clone, Debug)]
struct RouteForm {
    start: EndpointInput,
    end: EndpointInput,
    speed_kmh: String,
}

impl Default for RouteForm {
    fn default() -> Self {
        Self {
            start: EndpointInput::default(),
            end: EndpointInput::default(),
            speed_kmh: DEFAULT_SPEED_KMH.to_string(),
        }
    }
}

impl RouteForm {
    fn endpoint(&self, endpoint: Endpoint) -> &EndpointInput {
        match endpoint {
            Endpoint::Start => &self.start,
            Endpoint::End => &self.end,
        }
    }

    fn endpoint_mut(&mut self, endpoint: Endpoint) -> &mut EndpointInput {
        match endpoint {
            Endpoint::Start => &mut self.start,
            Endpoint::End => &mut self.end,
        }
    }

    /// Pins an endpoint to a map position, labelled by its coordinates.
    fn place(&mut self, endpoint: Endpoint, coordinate: Coordinate) {
        self.endpoint_mut(endpoint)
            .set_location(coordinate, format_lat_lon(coordinate));
    }

    fn to_request(&self) -> Result<RouteRequest, String> {
        let pick = |endpoint: Endpoint| {
            self.endpoint(endpoint)
                .coordinate
                .ok_or_else(|| format!("Choose a {} location", endpoint.label().to_lowercase()))
        };
        Ok(RouteRequest {
            start: pick(Endpoint::Start)?,
            end: pick(Endpoint::End)?,
        })
    }

    fn speed_kmh(&self) -> Result<f64, String> {
        let (min, max) = SPEED_RANGE_KMH;
        match self.speed_kmh.trim().parse::<f64>() {
            Ok(speed) if (min..=max).contains(&speed) => Ok(speed),
            _ => Err(format!("Vehicle speed must be between {min} and {max} km/h")),
        }
    }
}

pub enum Msg {
    QueryChanged(Endpoint, String),
    SearchDue(Endpoint, String),
    SuggestionsFetched(Endpoint, String, Result<Vec<Location>, String>),
    SuggestionPicked(Endpoint, usize),
    SetClickMode(Endpoint),
    MapClicked { lat: f64, lon: f64 },
    MarkerDragged(Endpoint, Coordinate),
    PlaceNamed(Endpoint, Coordinate, Result<Location, String>),
    SpeedChanged(String),
    Submit,
    RouteFetched(u32, Result<(RouteResponse, EtaResponse), String>),
    Play,
    Pause,
    Reset,
    PlaybackSpeedChanged(String),
    AnimationFrame,
}

/// Forwards engine output to the map and the progress readout.
struct MapSink<'a> {
    readout: &'a mut Readout,
}

impl RenderSink for MapSink<'_> {
    fn on_frame(&mut self, lat: f64, lon: f64, heading_degrees: f64) {
        update_vehicle_position(lat, lon, heading_degrees);
    }

    fn on_progress(&mut self, percent: u8, elapsed_seconds: u64) {
        *self.readout = Readout {
            percent,
            elapsed_seconds,
        };
    }
}

/// Frame subscription on a seed interval stream; dropping the handle ends it.
///
/// A ~60 Hz interval stands in for the display refresh: `after_next_render`
/// fires once and cannot be cancelled, while the engine needs a handle it can
/// drop on pause, reset and completion.
struct FrameStream<'a, O>(&'a mut O);

impl<O: Orders<Msg>> FrameScheduler for FrameStream<'_, O> {
    type Handle = StreamHandle;

    fn schedule(&mut self) -> StreamHandle {
        self.0
            .stream_with_handle(streams::interval(FRAME_INTERVAL_MS, || Msg::AnimationFrame))
    }
}

pub fn init(_: Url, orders: &mut impl Orders<Msg>) -> Model {
    orders.stream(streams::window_event(Ev::from("map-click"), |event| {
        let event = event.dyn_into::<web_sys::CustomEvent>().ok()?;
        let payload: MapClickPayload = serde_wasm_bindgen::from_value(event.detail()).ok()?;
        Some(Msg::MapClicked {
            lat: payload.lat,
            lon: payload.lon,
        })
    }));
    orders.stream(streams::window_event(Ev::from("marker-drag"), |event| {
        let event = event.dyn_into::<web_sys::CustomEvent>().ok()?;
        let payload: MarkerDragPayload = serde_wasm_bindgen::from_value(event.detail()).ok()?;
        Some(Msg::MarkerDragged(payload.endpoint, payload.coordinate()))
    }));

    let model = Model {
        form: RouteForm::default(),
        click_mode: Endpoint::Start,
        search_debounce: None,
        pending: false,
        route_generation: 0,
        route_info: None,
        engine: PlaybackEngine::new(performance_now as fn() -> f64),
        readout: Readout::default(),
        error: None,
    };
    sync_selection_markers(&model.form);
    model
}

pub fn update(msg: Msg, model: &mut Model, orders: &mut impl Orders<Msg>) {
    match msg {
        Msg::QueryChanged(endpoint, query) => {
            model.form.endpoint_mut(endpoint).set_query(query);
            endpoint_changed(model);
            // Replacing the handle cancels the previous timer.
            model.search_debounce = model.form.endpoint(endpoint).search_query().map(|query| {
                let handle = orders.perform_cmd_with_handle(cmds::timeout(
                    SEARCH_DEBOUNCE_MS,
                    move || Msg::SearchDue(endpoint, query),
                ));
                (endpoint, handle)
            });
        }
        Msg::SearchDue(endpoint, query) => {
            model.search_debounce = None;
            orders.perform_cmd(async move {
                let result = fetch_search(&query).await;
                Msg::SuggestionsFetched(endpoint, query, result)
            });
        }
        Msg::SuggestionsFetched(endpoint, query, result) => {
            let input = model.form.endpoint_mut(endpoint);
            if input.search_query().as_deref() != Some(query.as_str()) {
                return;
            }
            match result {
                Ok(locations) => input.suggestions = locations,
                Err(err) => {
                    web_sys::console::warn_1(&format!("[wayline] search failed: {err}").into());
                    model.error = Some(err);
                }
            }
        }
        Msg::SuggestionPicked(endpoint, index) => {
            let input = model.form.endpoint_mut(endpoint);
            let Some(location) = input.suggestions.get(index).cloned() else {
                return;
            };
            input.set_location(location.coordinate(), location.display_name);
            focus_location(location.lat, location.lon);
            endpoint_changed(model);
        }
        Msg::SetClickMode(mode) => model.click_mode = mode,
        Msg::MapClicked { lat, lon } => {
            let endpoint = model.click_mode;
            let coordinate = Coordinate { lat, lon };
            web_sys::console::debug_1(
                &format!("[wayline] map click {endpoint:?} lat={lat:.5} lon={lon:.5}").into(),
            );
            if endpoint == Endpoint::Start {
                model.click_mode = Endpoint::End;
            }
            pin_endpoint(model, orders, endpoint, coordinate);
        }
        Msg::MarkerDragged(endpoint, coordinate) => {
            web_sys::console::debug_1(
                &format!(
                    "[wayline] marker drag {endpoint:?} lat={:.5} lon={:.5}",
                    coordinate.lat, coordinate.lon
                )
                .into(),
            );
            pin_endpoint(model, orders, endpoint, coordinate);
        }
        Msg::PlaceNamed(endpoint, coordinate, result) => match result {
            Ok(place) => {
                let input = model.form.endpoint_mut(endpoint);
                if input.coordinate == Some(coordinate) {
                    input.query = place.display_name;
                }
            }
            Err(err) => {
                web_sys::console::debug_1(&format!("[wayline] no place name: {err}").into());
            }
        },
        Msg::SpeedChanged(value) => model.form.speed_kmh = value,
        Msg::Submit => {
            if model.pending {
                return;
            }
            let request = model
                .form
                .to_request()
                .and_then(|request| Ok((request, model.form.speed_kmh()?)));
            match request {
                Ok((request, speed_kmh)) => {
                    model.pending = true;
                    model.error = None;
                    let generation = model.route_generation;
                    orders.perform_cmd(async move {
                        Msg::RouteFetched(generation, fetch_route(request, speed_kmh).await)
                    });
                }
                Err(err) => model.error = Some(err),
            }
        }
        Msg::RouteFetched(generation, result) => {
            if generation != model.route_generation {
                return;
            }
            model.pending = false;
            match result.and_then(|(route, eta)| install_route(model, route, eta)) {
                Ok(()) => model.error = None,
                Err(err) => {
                    clear_route(model);
                    model.error = Some(err);
                }
            }
        }
        Msg::Play => model.engine.play(&mut FrameStream(orders)),
        Msg::Pause => model.engine.pause(),
        Msg::Reset => {
            let mut sink = MapSink {
                readout: &mut model.readout,
            };
            model.engine.reset(&mut sink);
        }
        Msg::PlaybackSpeedChanged(value) => {
            if let Ok(multiplier) = value.trim().parse::<u32>() {
                model.engine.set_speed_multiplier(multiplier);
            }
        }
        Msg::AnimationFrame => {
            let mut sink = MapSink {
                readout: &mut model.readout,
            };
            model.engine.tick(&mut sink);
        }
    }
}

/// Map-driven endpoint change: coordinates as the label until the reverse
/// lookup names the place.
fn pin_endpoint(
    model: &mut Model,
    orders: &mut impl Orders<Msg>,
    endpoint: Endpoint,
    coordinate: Coordinate,
) {
    model.form.place(endpoint, coordinate);
    endpoint_changed(model);
    orders.perform_cmd(async move {
        Msg::PlaceNamed(endpoint, coordinate, fetch_reverse(coordinate).await)
    });
}

fn install_route(model: &mut Model, route: RouteResponse, eta: EtaResponse) -> Result<(), String> {
    let playback = Route::new(route.path, eta.seconds).map_err(|err| err.to_string())?;
    push_route_to_map(playback.points());

    let mut sink = MapSink {
        readout: &mut model.readout,
    };
    model.engine.set_route(playback, &mut sink);
    model.route_info = Some(RouteInfo {
        distance_m: route.distance_m,
        eta,
    });
    Ok(())
}

/// Any endpoint edit invalidates the current route.
fn endpoint_changed(model: &mut Model) {
    model.route_generation = model.route_generation.wrapping_add(1);
    model.pending = false;
    clear_route(model);
    sync_selection_markers(&model.form);
}

fn clear_route(model: &mut Model) {
    if model.engine.route().is_none() && model.route_info.is_none() {
        return;
    }
    let mut sink = MapSink {
        readout: &mut model.readout,
    };
    model.engine.clear_route(&mut sink);
    model.route_info = None;
    clear_route_js();
}

async fn fetch_json<T: DeserializeOwned + 'static>(request: Request<'_>) -> Result<T, String> {
    let response = request.fetch().await.map_err(|err| format!("{err:?}"))?;
    let status = response.status();
    if status.is_ok() {
        return response.json::<T>().await.map_err(|err| format!("{err:?}"));
    }
    match response.json::<ApiError>().await {
        Ok(api) if api.initializing => Err(format!(
            "{} (the geocoder is still loading, try again shortly)",
            api.message
        )),
        Ok(api) => Err(api.message),
        Err(_) => Err(format!("HTTP {} {}", status.code, status.text)),
    }
}

async fn fetch_search(query: &str) -> Result<Vec<Location>, String> {
    let encoded = String::from(js_sys::encode_uri_component(query));
    let url = format!("{}/search?q={encoded}", api_root());
    web_sys::console::debug_1(&format!("[wayline] search {url}").into());
    let response: SearchResponse = fetch_json(Request::new(url)).await?;
    Ok(response.locations)
}

async fn fetch_reverse(coordinate: Coordinate) -> Result<Location, String> {
    let url = format!(
        "{}/reverse?lat={}&lon={}",
        api_root(),
        coordinate.lat,
        coordinate.lon
    );
    fetch_json(Request::new(url)).await
}

/// Route geometry first, then the speed-based ETA that drives playback.
async fn fetch_route(
    payload: RouteRequest,
    speed_kmh: f64,
) -> Result<(RouteResponse, EtaResponse), String> {
    web_sys::console::debug_1(
        &format!(
            "[wayline] route request start=({:.5},{:.5}) end=({:.5},{:.5})",
            payload.start.lat, payload.start.lon, payload.end.lat, payload.end.lon
        )
        .into(),
    );
    let request = Request::new(format!("{}/route", api_root()))
        .method(Method::Post)
        .json(&payload)
        .map_err(|err| format!("{err:?}"))?;
    let route: RouteResponse = fetch_json(request).await?;

    let request = Request::new(format!("{}/eta", api_root()))
        .method(Method::Post)
        .json(&EtaRequest {
            distance_m: route.distance_m,
            speed_kmh,
        })
        .map_err(|err| format!("{err:?}"))?;
    let eta: EtaResponse = fetch_json(request).await?;
    Ok((route, eta))
}

pub fn view(model: &Model) -> Node<Msg> {
    div![
        C!["app-container"],
        h1!["Wayline"],
        view_form(model),
        view_route(model),
    ]
}

fn view_endpoint(model: &Model, endpoint: Endpoint) -> Node<Msg> {
    let input = model.form.endpoint(endpoint);
    div![
        C!["input-field"],
        label![endpoint.label()],
        input![
            attrs! {
                At::Value => &input.query,
                At::Placeholder => "Search a place or type lat, lon",
                At::AutoComplete => "off",
                At::SpellCheck => "false",
            },
            input_ev(Ev::Input, move |value| Msg::QueryChanged(endpoint, value)),
        ],
        match &model.search_debounce {
            Some((pending, _)) if *pending == endpoint => small![C!["hint"], "Searching…"],
            _ => empty![],
        },
        if input.suggestions.is_empty() {
            empty![]
        } else {
            ul![
                C!["suggestions"],
                input.suggestions.iter().enumerate().map(|(index, location)| {
                    li![
                        C!["suggestion-item"],
                        location.display_name.as_str(),
                        ev(Ev::Click, move |_| Msg::SuggestionPicked(endpoint, index)),
                    ]
                }),
            ]
        },
    ]
}

fn view_form(model: &Model) -> Node<Msg> {
    let click_mode_option = |mode: Endpoint| {
        label![
            input![
                attrs! {
                    At::Type => "radio",
                    At::Name => "click-mode",
                    At::Checked => bool_attr(model.click_mode == mode),
                },
                ev(Ev::Change, move |_| Msg::SetClickMode(mode)),
            ],
            span![mode.label()],
        ]
    };

    form![
        C!["controls"],
        fieldset![
            legend!["Locations"],
            view_endpoint(model, Endpoint::Start),
            view_endpoint(model, Endpoint::End),
        ],
        fieldset![
            legend!["Map clicks set"],
            div![
                C!["click-mode"],
                click_mode_option(Endpoint::Start),
                click_mode_option(Endpoint::End),
            ],
        ],
        fieldset![
            legend!["Vehicle"],
            input![
                attrs! {
                    At::Type => "range",
                    At::Min => SPEED_RANGE_KMH.0,
                    At::Max => SPEED_RANGE_KMH.1,
                    At::Value => &model.form.speed_kmh,
                },
                input_ev(Ev::Input, Msg::SpeedChanged),
            ],
            span![C!["speed-display"], format!("{} km/h", model.form.speed_kmh)],
        ],
        button![
            if model.pending {
                "Calculating…"
            } else {
                "Calculate route"
            },
            ev(Ev::Click, |event| {
                event.prevent_default();
                Msg::Submit
            }),
            attrs! { At::Disabled => bool_attr(model.pending) },
        ],
        if let Some(error) = &model.error {
            p![C!["error"], error]
        } else {
            empty![]
        }
    ]
}

fn view_route(model: &Model) -> Node<Msg> {
    let Some(info) = &model.route_info else {
        return div![
            C!["preview"],
            p!["Pick a start and a destination, then calculate the route."]
        ];
    };

    let card = |label: &str, content: String| {
        div![
            C!["metadata-card"],
            span![C!["label"], label],
            strong![content],
        ]
    };
    let control = |text: &str, msg: fn() -> Msg, disabled: bool| {
        button![
            text,
            ev(Ev::Click, move |event| {
                event.prevent_default();
                msg()
            }),
            attrs! { At::Disabled => bool_attr(disabled) },
        ]
    };
    let multiplier = model.engine.speed_multiplier();

    div![
        C!["preview"],
        div![
            C!["metadata-grid"],
            card("Distance", format!("{:.2} km", info.distance_m / 1000.0)),
            card("ETA", info.eta.formatted.clone()),
            card("Progress", format!("{}%", model.readout.percent)),
            card("Elapsed", format_clock(model.readout.elapsed_seconds)),
        ],
        div![
            C!["animation-controls"],
            control(
                "▶ Play",
                || Msg::Play,
                model.engine.is_playing() || model.engine.is_finished()
            ),
            control("⏸ Pause", || Msg::Pause, !model.engine.is_playing()),
            control("⟲ Reset", || Msg::Reset, false),
            select![
                PLAYBACK_SPEEDS.iter().map(|speed| {
                    option![
                        attrs! {
                            At::Value => speed,
                            At::Selected => bool_attr(*speed == multiplier),
                        },
                        format!("{speed}×"),
                    ]
                }),
                input_ev(Ev::Change, Msg::PlaybackSpeedChanged),
            ],
        ],
    ]
}

#[wasm_bindgen(start)]
pub fn start() {
    init_map();
    App::start("app", init, update, view);
}

fn push_route_to_map(path: &[Coordinate]) {
    if let Ok(value) = to_value(path) {
        update_route_js(value);
    }
}

fn sync_selection_markers(form: &RouteForm) {
    let marker = |input: &EndpointInput| {
        input
            .coordinate
            .and_then(|coord| to_value(&coord).ok())
            .unwrap_or(JsValue::NULL)
    };
    update_selection_markers(marker(&form.start), marker(&form.end));
}

/// Accepts `"lat, lon"` or `"lat lon"` within coordinate bounds.
fn parse_lat_lon(text: &str) -> Option<Coordinate> {
    let mut parts = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty());
    let lat = parts.next()?.parse::<f64>().ok()?;
    let lon = parts.next()?.parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let coord = Coordinate { lat, lon };
    coord.is_valid().then_some(coord)
}

fn format_lat_lon(coord: Coordinate) -> String {
    format!("{:.6}, {:.6}", coord.lat, coord.lon)
}

fn bool_attr(value: bool) -> AtValue {
    if value {
        AtValue::Some("true".into())
    } else {
        AtValue::Ignored
    }
}

#[derive(Deserialize)]
struct MapClickPayload {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct MarkerDragPayload {
    endpoint: Endpoint,
    lat: f64,
    lon: f64,
}

impl MarkerDragPayload {
    fn coordinate(&self) -> Coordinate {
        Coordinate {
            lat: self.lat,
            lon: self.lon,
        }
    }
}
