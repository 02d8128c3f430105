use csv::ReaderBuilder;
use serde::Deserializer;
use serde::{Deserialize, Serialize};
use std::{fs, fs::File};
use std::{io::Read, option::Option};
use thiserror::Error;

use serde_json::{Map, Value};

/// This module parses pandapower network exports (JSON, CSV folders, zipped CSV).

/// Errors raised while loading a network from disk.
#[derive(Debug, Error)]
pub enum NetworkFileError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("required table `{0}` is missing or malformed")]
    MissingTable(&'static str),
}

/// Deserializes a number from JSON format.
fn from_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = Deserialize::deserialize(deserializer)?;
    if let serde_json::Value::Number(n) = val {
        if let Some(res) = n.as_f64() {
            return Ok(Some(res as i64));
        }
    }
    Ok(None)
}

/// Deserializes a string from JSON format.
fn from_str<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let val: serde_json::Value = Deserialize::deserialize(deserializer)?;
    if let serde_json::Value::Number(n) = val {
        return Ok(Some(n.to_string()));
    }
    if let serde_json::Value::String(s) = val {
        return Ok(Some(s));
    }
    Ok(None)
}

/// Represents a bus in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Bus {
    #[serde(default)]
    pub index: i64,
    pub in_service: bool,
    #[serde(default)]
    pub max_vm_pu: Option<f64>,
    #[serde(default)]
    pub min_vm_pu: Option<f64>,
    #[serde(default, deserialize_with = "from_str")]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>, // Added underscore to avoid conflict with Rust keyword
    pub vn_kv: f64,
    #[serde(default, deserialize_with = "from_number")]
    pub zone: Option<i64>,
}

/// Represents a generator in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Gen {
    pub bus: i64,
    #[serde(default)]
    pub controllable: Option<bool>,
    pub in_service: bool,
    #[serde(default)]
    pub name: Option<String>,
    pub p_mw: f64,
    #[serde(default)]
    pub scaling: f64,
    #[serde(default)]
    pub sn_mva: Option<f64>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    pub vm_pu: f64,
    #[serde(default)]
    pub slack: bool,
}

/// Represents a load in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Load {
    pub bus: i64,
    #[serde(default)]
    pub controllable: Option<bool>,
    pub in_service: bool,
    #[serde(default)]
    pub name: Option<String>,
    pub p_mw: f64,
    pub q_mvar: f64,
    #[serde(default)]
    pub scaling: f64,
    #[serde(default)]
    pub sn_mva: Option<f64>,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
}

/// Represents a static generator in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct SGen {
    #[serde(default)]
    pub name: Option<String>,
    pub bus: i64,
    pub p_mw: f64,
    pub q_mvar: f64,
    #[serde(default)]
    pub sn_mva: Option<f64>,
    #[serde(default)]
    pub scaling: f64,
    pub in_service: bool,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    #[serde(default)]
    pub controllable: Option<bool>,
}

/// Represents a line in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Line {
    #[serde(default)]
    pub c_nf_per_km: f64,
    pub from_bus: i64,
    pub to_bus: i64,
    #[serde(default)]
    pub g_us_per_km: f64,
    pub in_service: bool,
    pub length_km: f64,
    #[serde(default)]
    pub max_i_ka: f64,
    #[serde(default)]
    pub max_loading_percent: Option<f64>,
    #[serde(default)]
    pub parallel: i32,
    pub r_ohm_per_km: f64,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    pub x_ohm_per_km: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub std_type: Option<String>,
}

/// Represents a two-winding transformer in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Trafo {
    pub hv_bus: i64,
    pub lv_bus: i64,
    #[serde(default)]
    pub i0_percent: f64,
    pub in_service: bool,
    #[serde(default)]
    pub max_loading_percent: Option<f64>,
    #[serde(default)]
    pub parallel: i32,
    #[serde(default)]
    pub pfe_kw: f64,
    #[serde(default)]
    pub shift_degree: f64,
    pub sn_mva: f64,
    pub vn_hv_kv: f64,
    pub vn_lv_kv: f64,
    pub vk_percent: f64,
    pub vkr_percent: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub std_type: Option<String>,
    #[serde(default)]
    pub tap_side: Option<String>,
    #[serde(default)]
    pub tap_neutral: Option<f64>,
    #[serde(default)]
    pub tap_max: Option<f64>,
    #[serde(default)]
    pub tap_pos: Option<f64>,
    #[serde(default)]
    pub tap_min: Option<f64>,
    #[serde(default)]
    pub tap_step_degree: Option<f64>,
    #[serde(default)]
    pub tap_step_percent: Option<f64>,
}

/// Represents a three-winding transformer in the network.
///
/// The three windings connect a high, a medium and a low voltage bus; rated
/// powers and short-circuit voltages are stored per winding pair as in
/// pandapower's `trafo3w` table.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Trafo3w {
    pub hv_bus: i64,
    pub mv_bus: i64,
    pub lv_bus: i64,
    pub in_service: bool,
    pub vn_hv_kv: f64,
    pub vn_mv_kv: f64,
    pub vn_lv_kv: f64,
    pub sn_hv_mva: f64,
    pub sn_mv_mva: f64,
    pub sn_lv_mva: f64,
    pub vk_hv_percent: f64,
    pub vk_mv_percent: f64,
    pub vk_lv_percent: f64,
    pub vkr_hv_percent: f64,
    pub vkr_mv_percent: f64,
    pub vkr_lv_percent: f64,
    #[serde(default)]
    pub pfe_kw: f64,
    #[serde(default)]
    pub i0_percent: f64,
    #[serde(default)]
    pub shift_mv_degree: f64,
    #[serde(default)]
    pub shift_lv_degree: f64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub std_type: Option<String>,
    #[serde(default)]
    pub tap_side: Option<String>,
    #[serde(default)]
    pub tap_neutral: Option<f64>,
    #[serde(default)]
    pub tap_max: Option<f64>,
    #[serde(default)]
    pub tap_pos: Option<f64>,
    #[serde(default)]
    pub tap_min: Option<f64>,
    #[serde(default)]
    pub tap_step_percent: Option<f64>,
}

/// Represents an external grid in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct ExtGrid {
    pub bus: i64,
    pub in_service: bool,
    #[serde(default)]
    pub va_degree: f64,
    pub vm_pu: f64,
    #[serde(default)]
    pub max_p_mw: Option<f64>,
    #[serde(default)]
    pub min_p_mw: Option<f64>,
    #[serde(default)]
    pub max_q_mvar: Option<f64>,
    #[serde(default)]
    pub min_q_mvar: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
}

/// Represents a shunt in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Shunt {
    pub bus: i64,
    pub q_mvar: f64,
    pub p_mw: f64,
    pub vn_kv: f64,
    #[serde(default)]
    pub step: i32,
    #[serde(default)]
    pub max_step: i32,
    pub in_service: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, PartialEq, Serialize, Deserialize, Clone)]
pub enum SwitchType {
    #[serde(rename = "l")]
    SwitchBusLine,
    #[serde(rename = "t")]
    SwitchBusTransformer,
    #[serde(rename = "t3")]
    SwitchBusTransformer3w,
    #[serde(rename = "b")]
    #[default]
    SwitchTwoBuses,
    Unknown,
}

/// Represents a switch in the network.
#[derive(Default, Debug, Serialize, Deserialize, Clone)]
pub struct Switch {
    pub bus: i64,
    pub element: i64,
    pub et: SwitchType,
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
    pub closed: bool,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub z_ohm: f64,
}

impl From<&str> for SwitchType {
    fn from(s: &str) -> SwitchType {
        match s {
            "l" => SwitchType::SwitchBusLine,
            "t" => SwitchType::SwitchBusTransformer,
            "t3" => SwitchType::SwitchBusTransformer3w,
            "b" => SwitchType::SwitchTwoBuses,
            _ => SwitchType::Unknown,
        }
    }
}

/// Represents a network.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Network {
    pub gen: Option<Vec<Gen>>,
    pub bus: Vec<Bus>,
    pub load: Option<Vec<Load>>,
    pub line: Option<Vec<Line>>,
    pub trafo: Option<Vec<Trafo>>,
    pub trafo3w: Option<Vec<Trafo3w>>,
    pub shunt: Option<Vec<Shunt>>,
    pub ext_grid: Option<Vec<ExtGrid>>,
    pub sgen: Option<Vec<SGen>>,
    pub switch: Option<Vec<Switch>>,
    pub f_hz: f64,
    pub sn_mva: f64,
}

impl Default for Network {
    fn default() -> Self {
        Self {
            gen: None,
            bus: Vec::new(),
            load: None,
            line: None,
            trafo: None,
            trafo3w: None,
            shunt: None,
            ext_grid: None,
            sgen: None,
            switch: None,
            f_hz: 60.0,
            sn_mva: 100.0,
        }
    }
}

/// Number of rows in an optional element table.
pub fn table_len<T>(table: &Option<Vec<T>>) -> usize {
    table.as_ref().map_or(0, |t| t.len())
}

/// Loads a pandapower CSV file into a vector of the specified type.
fn load_pandapower_csv<T: for<'de> Deserialize<'de>>(name: &str) -> Option<Vec<T>> {
    let file = read_csv(name).ok()?;
    let mut rdr = ReaderBuilder::new().from_reader(file.as_bytes());
    let headers = rdr.headers().ok()?.to_owned();
    let mut records: Vec<T> = Vec::new();
    for rec in rdr.records() {
        let record = rec.ok()?;
        records.push(record.deserialize(Some(&headers)).ok()?);
    }
    Some(records)
}

/// Reads a CSV file and replaces "True"/"False" with "true"/"false".
fn read_csv(name: &str) -> Result<String, std::io::Error> {
    let mut file = File::open(name)?;
    let mut buffer = String::new();
    file.read_to_string(&mut buffer)?;
    let file = buffer.replace("True", "true").replace("False", "false");
    Ok(file)
}

/// Reads a CSV table from the given map and deserializes it into a vector of the specified type.
fn csv_from_map<T: for<'de> Deserialize<'de>>(
    map: &std::collections::HashMap<String, String>,
    key: &str,
) -> Option<Vec<T>> {
    let s = map
        .get(key)?
        .replace("True", "true")
        .replace("False", "false");
    let mut rdr = ReaderBuilder::new().from_reader(s.as_bytes());
    let headers = rdr.headers().ok()?.to_owned();
    let mut records: Vec<T> = Vec::new();
    for rec in rdr.records() {
        let record = rec.ok()?;
        records.push(record.deserialize(Some(&headers)).ok()?);
    }
    if records.is_empty() {
        return None;
    }
    Some(records)
}

/// Macro to read network tables from an in-memory CSV map.
macro_rules! read_csv_network {
    ($net:ident, $map:ident, { $($field:ident: $file:expr),* $(,)? }) => {
        $(
            $net.$field = csv_from_map(&$map, $file);
        )*
    };
}

/// Macro to read network tables from a CSV folder.
macro_rules! read_csv_network_folder {
    ($net:ident,  { $($field:ident: $file:expr),* $(,)? }) => {
        $(
            $net.$field = load_pandapower_csv($file);
        )*
    };
}

/// Macro to read network tables from a json key.
macro_rules! read_json_network {
    ($net:ident, $map:ident, { $($field:ident: $file:expr),* $(,)? }) => {
        $(
            $net.$field = load_pandapower_element_json(&$map, $file);
        )*
    };
}

/// Loads a CSV folder into a Network structure.
pub fn load_csv_folder(folder: &str) -> Result<Network, NetworkFileError> {
    let path = |t: &str| format!("{folder}/{t}.csv");
    let mut net = Network::default();
    net.bus = load_pandapower_csv(&path("bus")).ok_or(NetworkFileError::MissingTable("bus"))?;
    let (gen, line, shunt, trafo, trafo3w, ext_grid, load, sgen, switch) = (
        path("gen"),
        path("line"),
        path("shunt"),
        path("trafo"),
        path("trafo3w"),
        path("ext_grid"),
        path("load"),
        path("sgen"),
        path("switch"),
    );
    read_csv_network_folder!(net,  {
        gen: &gen,
        line: &line,
        shunt: &shunt,
        trafo: &trafo,
        trafo3w: &trafo3w,
        ext_grid: &ext_grid,
        load: &load,
        sgen: &sgen,
        switch: &switch
    });
    Ok(net)
}

/// Loads a network from a ZIP file containing CSV tables.
pub fn load_csv_zip(name: &str) -> Result<Network, NetworkFileError> {
    let f = File::open(name)?;
    let mut zip = zip::ZipArchive::new(f)?;
    let mut map = std::collections::HashMap::new();
    for i in 0..zip.len() {
        let mut file = zip.by_index(i)?;
        if file.is_file() {
            let mut s = String::with_capacity(file.size() as usize);
            file.read_to_string(&mut s)?;
            map.insert(file.name().to_owned(), s);
        }
    }

    let mut net = Network::default();
    net.bus = csv_from_map(&map, "bus.csv").ok_or(NetworkFileError::MissingTable("bus"))?;
    read_csv_network!(net, map, {
        gen: "gen.csv",
        line: "line.csv",
        shunt: "shunt.csv",
        trafo: "trafo.csv",
        trafo3w: "trafo3w.csv",
        ext_grid: "ext_grid.csv",
        load: "load.csv",
        sgen: "sgen.csv",
        switch: "switch.csv"
    });
    Ok(net)
}

fn load_json_from_str(file_content: &str) -> Result<Map<String, Value>, NetworkFileError> {
    let parsed: Value = serde_json::from_str(file_content)?;
    parsed
        .as_object()
        .cloned()
        .ok_or(NetworkFileError::MissingTable("_object"))
}

fn load_json(file_path: &str) -> Result<Map<String, Value>, NetworkFileError> {
    let file_content = fs::read_to_string(file_path)?;
    load_json_from_str(&file_content)
}

/// Decodes one pandapower DataFrame export (`columns` + `data` rows) into element structs.
fn load_pandapower_element_json<T: serde::de::DeserializeOwned>(
    object: &Map<String, Value>,
    key: &str,
) -> Option<Vec<T>> {
    let element = object
        .get(key)
        .and_then(|v| v.as_object())
        .and_then(|v| v.get("_object"))?;
    let map = load_json_from_str(element.as_str()?).ok()?;

    let headers = map.get("columns").and_then(|v| v.as_array())?.to_owned();
    let rows = map.get("data").and_then(|v| v.as_array())?;

    let mut elements = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let mut obj: Map<String, Value> = headers
            .iter()
            .zip(row.as_array()?.iter())
            .fold(Map::new(), |mut acc, (k, v)| {
                if let Some(key) = k.as_str() {
                    acc.insert(key.to_string(), v.to_owned());
                }
                acc
            });

        obj.insert(
            "index".to_string(),
            Value::Number(serde_json::Number::from(index as i64)),
        );

        let elem: T = serde_json::from_value(obj.into()).ok()?;
        elements.push(elem);
    }

    Some(elements)
}

/// Loads a network from an already-parsed pandapower JSON object.
pub fn load_pandapower_json_obj(object: &Map<String, Value>) -> Result<Network, NetworkFileError> {
    let mut net = Network::default();
    net.bus = load_pandapower_element_json(object, "bus")
        .ok_or(NetworkFileError::MissingTable("bus"))?;
    read_json_network!(net, object, {
        gen: "gen",
        line: "line",
        shunt: "shunt",
        trafo: "trafo",
        trafo3w: "trafo3w",
        ext_grid: "ext_grid",
        load: "load",
        sgen: "sgen",
        switch: "switch"
    });
    if let Some(f_hz) = object.get("f_hz").and_then(|v| v.as_f64()) {
        net.f_hz = f_hz;
    }
    if let Some(sn_mva) = object.get("sn_mva").and_then(|v| v.as_f64()) {
        net.sn_mva = sn_mva;
    }
    Ok(net)
}

/// Loads a network from a pandapower JSON export file.
pub fn load_pandapower_json(file_path: &str) -> Result<Network, NetworkFileError> {
    let map: Map<String, Value> = load_json(file_path)?;
    let object = map
        .get("_object")
        .and_then(|v| v.as_object())
        .ok_or(NetworkFileError::MissingTable("_object"))?;
    load_pandapower_json_obj(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_csv() -> &'static str {
        "index,in_service,max_vm_pu,min_vm_pu,name,type,vn_kv,zone\n\
         0,True,1.1,0.9,hv,b,110.0,1\n\
         1,True,1.1,0.9,lv,b,20.0,1\n"
    }

    #[test]
    fn test_bus_csv_parse() {
        let file = bus_csv().replace("True", "true");
        let mut rdr = ReaderBuilder::new().from_reader(file.as_bytes());
        let buses: Vec<Bus> = rdr.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(buses.len(), 2);
        assert_eq!(buses[0].vn_kv, 110.0);
        assert!(buses[1].in_service);
    }

    #[test]
    fn test_csv_map_load() {
        let mut map = std::collections::HashMap::new();
        map.insert("bus.csv".to_string(), bus_csv().to_string());
        let buses: Vec<Bus> = csv_from_map(&map, "bus.csv").unwrap();
        assert_eq!(buses.len(), 2);
        assert!(csv_from_map::<Bus>(&map, "line.csv").is_none());
    }

    #[test]
    fn test_element_json_decode() {
        let table = serde_json::json!({
            "columns": ["in_service", "vn_kv", "name", "type", "zone",
                        "max_vm_pu", "min_vm_pu"],
            "data": [[true, 345.0, "bus_0", "b", 1, 1.1, 0.9],
                     [true, 345.0, "bus_1", "b", 1, 1.1, 0.9]]
        });
        let obj = serde_json::json!({
            "bus": { "_object": table.to_string() }
        });
        let obj = obj.as_object().unwrap();
        let buses: Vec<Bus> = load_pandapower_element_json(obj, "bus").unwrap();
        assert_eq!(buses.len(), 2);
        assert_eq!(buses[1].index, 1);
        assert_eq!(buses[1].vn_kv, 345.0);
    }

    #[test]
    fn test_json_obj_load() {
        let bus_table = serde_json::json!({
            "columns": ["in_service", "vn_kv"],
            "data": [[true, 110.0]]
        });
        let trafo3w_table = serde_json::json!({
            "columns": ["hv_bus", "mv_bus", "lv_bus", "in_service",
                        "vn_hv_kv", "vn_mv_kv", "vn_lv_kv",
                        "sn_hv_mva", "sn_mv_mva", "sn_lv_mva",
                        "vk_hv_percent", "vk_mv_percent", "vk_lv_percent",
                        "vkr_hv_percent", "vkr_mv_percent", "vkr_lv_percent",
                        "pfe_kw", "i0_percent", "shift_mv_degree", "shift_lv_degree"],
            "data": [[0, 1, 2, true, 110.0, 20.0, 10.0, 63.0, 25.0, 38.0,
                      10.4, 10.4, 10.4, 0.28, 0.32, 0.35, 35.0, 0.89, 0.0, 0.0]]
        });
        let obj = serde_json::json!({
            "bus": { "_object": bus_table.to_string() },
            "trafo3w": { "_object": trafo3w_table.to_string() },
            "f_hz": 50.0,
            "sn_mva": 100.0
        });
        let net = load_pandapower_json_obj(obj.as_object().unwrap()).unwrap();
        assert_eq!(net.bus.len(), 1);
        assert_eq!(net.f_hz, 50.0);
        let t3 = net.trafo3w.unwrap();
        assert_eq!(t3[0].mv_bus, 1);
        assert_eq!(t3[0].sn_mv_mva, 25.0);
    }

    #[test]
    fn test_missing_bus_table_is_error() {
        let obj = serde_json::json!({});
        let err = load_pandapower_json_obj(obj.as_object().unwrap());
        assert!(matches!(err, Err(NetworkFileError::MissingTable("bus"))));
    }
}
