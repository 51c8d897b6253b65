use pyo3::prelude::*;
use pyo3::exceptions::{PyConnectionError, PyRuntimeError, PyValueError};

use crate::actuator::AccessoryMode;
use crate::behavior::Detection;
use crate::config::AppConfig;
use crate::control::IntentSource;
use crate::error::Error;
use crate::robot::Robot;

fn to_py_err(e: Error) -> PyErr{
    match e{
        Error::Connection{ .. } => PyConnectionError::new_err(e.to_string()),
        Error::Command(_) | Error::Config(_) | Error::Toml(_) => PyValueError::new_err(e.to_string()),
        _ => PyRuntimeError::new_err(e.to_string()),
    }
}

//(label, x, y, area) tuples from the vision pipeline; unknown labels are dropped
fn to_detections(raw: Vec<(String, f32, f32, f32)>) -> Vec<Detection>{
    raw.into_iter()
        .filter_map(|(label, x, y, area)| Detection::from_label(&label, x, y, area))
        .collect()
}

#[pyclass(name = "Robot")]
pub struct PyRobot{
    inner: Robot,
}

#[pymethods]
impl PyRobot{
    #[new]
    #[pyo3(signature = (config_path=None))]
    fn new(config_path: Option<&str>) -> PyResult<Self>{
        let config = match config_path{
            Some(path) => AppConfig::from_file(path).map_err(to_py_err)?,
            None => AppConfig::default(),
        };
        let inner = Robot::open(config).map_err(to_py_err)?;
        Ok(PyRobot{ inner })
    }

    fn start_game(&self){
        self.inner.start_game();
    }

    fn stop_game(&self){
        self.inner.stop_game();
    }

    //returns the behavior state name after the update
    fn update(&self, detections: Vec<(String, f32, f32, f32)>, frame_width: f32, frame_height: f32) -> PyResult<String>{
        let state = self.inner
            .update_behavior(to_detections(detections), frame_width, frame_height)
            .map_err(to_py_err)?;
        Ok(format!("{:?}", state))
    }

    fn set_velocity(&self, vx: f32, vy: f32, omega: f32) -> PyResult<()>{
        self.inner.compensator()
            .set_intent(IntentSource::Operator, vx, vy, omega)
            .map_err(to_py_err)
    }

    fn set_collector(&self, mode: &str) -> PyResult<()>{
        let mode: AccessoryMode = mode.parse().map_err(to_py_err)?;
        self.inner.compensator()
            .set_accessory(IntentSource::Operator, mode)
            .map_err(to_py_err)
    }

    fn emergency_stop(&self){
        self.inner.compensator().emergency_stop();
    }

    fn reset_heading(&self){
        self.inner.compensator().reset_heading();
    }

    fn heading(&self) -> f32{
        self.inner.sensors().heading()
    }

    fn drift_rate(&self) -> f32{
        self.inner.sensors().drift_rate()
    }

    fn balls_collected(&self) -> u32{
        self.inner.balls_collected()
    }

    fn state(&self) -> String{
        format!("{:?}", self.inner.behavior_state())
    }

    fn status(&self) -> String{
        self.inner.status().to_string()
    }

    fn close(&self){
        self.inner.shutdown();
    }
}

#[pymodule]
fn proustite(_py: Python, m: &PyModule) -> PyResult<()>{
    m.add_class::<PyRobot>()?;
    Ok(())
}

#[cfg(test)]
mod tests{
    use super::*;
    use crate::behavior::{GoalColor, ObjectKind};

    #[test]
    fn test_to_detections_drops_unknown(){
        let detections = to_detections(vec![
            ("Ball".to_string(), 10.0, 20.0, 300.0),
            ("Referee".to_string(), 0.0, 0.0, 50.0),
            ("Yellow Goal".to_string(), 320.0, 240.0, 90000.0),
        ]);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].kind, ObjectKind::Ball);
        assert_eq!(detections[1].kind, ObjectKind::Goal(GoalColor::Yellow));
    }
}
