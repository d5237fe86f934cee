use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// IMEI 解析结果：设备当前绑定的车辆。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleBinding {
    pub vehicle_id: i64,
    pub device_id: i64,
}

/// 单条 IO 元素的投影函数。
type IoSetter = fn(&mut IoSnapshot, i64);

fn set_ignition(io: &mut IoSnapshot, value: i64) {
    io.ignition = Some(value == 1);
}

fn set_movement(io: &mut IoSnapshot, value: i64) {
    io.movement = Some(value == 1);
}

fn set_gsm_signal(io: &mut IoSnapshot, value: i64) {
    io.gsm_signal = Some(value);
}

fn set_external_voltage(io: &mut IoSnapshot, value: i64) {
    io.external_voltage = Some(value);
}

fn set_battery_voltage(io: &mut IoSnapshot, value: i64) {
    io.battery_voltage = Some(value);
}

fn set_battery_current(io: &mut IoSnapshot, value: i64) {
    io.battery_current = Some(value);
}

fn set_gnss_status(io: &mut IoSnapshot, value: i64) {
    io.gnss_status = Some(value);
}

fn set_pdop(io: &mut IoSnapshot, value: i64) {
    io.pdop = Some(value);
}

fn set_hdop(io: &mut IoSnapshot, value: i64) {
    io.hdop = Some(value);
}

fn set_sleep_mode(io: &mut IoSnapshot, value: i64) {
    io.sleep_mode = Some(value);
}

fn set_gsm_operator(io: &mut IoSnapshot, value: i64) {
    io.gsm_operator = Some(value);
}

fn set_total_odometer(io: &mut IoSnapshot, value: i64) {
    io.total_odometer = Some(value);
}

/// IO 元素 ID → 命名字段投影表。
///
/// 新增 IO 映射只需在此追加一行。
const IO_PROJECTIONS: &[(u8, IoSetter)] = &[
    (239, set_ignition),
    (240, set_movement),
    (21, set_gsm_signal),
    (66, set_external_voltage),
    (67, set_battery_voltage),
    (68, set_battery_current),
    (69, set_gnss_status),
    (181, set_pdop),
    (182, set_hdop),
    (200, set_sleep_mode),
    (241, set_gsm_operator),
    (16, set_total_odometer),
];

/// 单条定位记录的 IO 快照。
///
/// `elements` 保存帧中出现的全部 IO 元素；命名字段为其投影，
/// 帧中未出现的 ID 对应 `None`（未知），不会填充默认值。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoSnapshot {
    pub elements: BTreeMap<u8, i64>,
    pub ignition: Option<bool>,
    pub movement: Option<bool>,
    pub gsm_signal: Option<i64>,
    pub external_voltage: Option<i64>,
    pub battery_voltage: Option<i64>,
    pub battery_current: Option<i64>,
    pub gnss_status: Option<i64>,
    pub pdop: Option<i64>,
    pub hdop: Option<i64>,
    pub sleep_mode: Option<i64>,
    pub gsm_operator: Option<i64>,
    pub total_odometer: Option<i64>,
}

impl IoSnapshot {
    /// 由原始 IO 元素构建快照并完成命名字段投影。
    pub fn from_elements(elements: BTreeMap<u8, i64>) -> Self {
        let mut io = Self {
            elements,
            ..Self::default()
        };
        for (id, apply) in IO_PROJECTIONS {
            if let Some(value) = io.elements.get(id).copied() {
                apply(&mut io, value);
            }
        }
        io
    }
}

/// 一条 GPS 定位记录（解码后不可变）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// 定位时间（毫秒）
    pub ts_ms: i64,
    pub priority: u8,
    /// 纬度（度）
    pub lat: f64,
    /// 经度（度）
    pub lng: f64,
    /// 海拔（米）
    pub altitude: i16,
    /// 航向角（度）
    pub angle: u16,
    pub satellites: u8,
    /// 速度（km/h）
    pub speed: u16,
    pub io: IoSnapshot,
}

/// 工作队列消息：一帧解码后的记录批次。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryBatch {
    pub vehicle_id: i64,
    pub device_id: i64,
    pub bytes_received: u64,
    pub records: Vec<Record>,
}

/// 停车区间类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopKind {
    /// 点火状态下的停车
    Stop,
    /// 熄火驻车
    Parking,
}

impl StopKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Parking => "parking",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "stop" => Some(Self::Stop),
            "parking" => Some(Self::Parking),
            _ => None,
        }
    }
}

/// 发动机事件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEventKind {
    On,
    Off,
}

impl EngineEventKind {
    pub fn from_ignition(ignition: bool) -> Self {
        if ignition { Self::On } else { Self::Off }
    }

    pub fn ignition(&self) -> bool {
        matches!(self, Self::On)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            _ => None,
        }
    }
}
