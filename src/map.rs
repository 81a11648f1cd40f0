//! Marker maps for reports and users, plus the solve-report action.
//!
//! A terminal has no tiles, so a map is a marker list: one line per entity
//! with an OpenStreetMap link centered on it.

use crate::api::{server_message, ApiClient, SolveUpdate};
use crate::config::MapConfig;
use crate::forms::{Field, FieldError, Form};
use crate::forms::validation;
use crate::models::{Location, Report, User};
use crate::notify::Notice;
use crate::table;

/// Anything that can be placed on a map
pub trait Geotagged {
    fn location(&self) -> Option<Location>;
    /// Popup lines shown with the marker
    fn popup(&self) -> Vec<String>;
}

impl Geotagged for Report {
    fn location(&self) -> Option<Location> {
        Some(self.location)
    }

    fn popup(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.mobile_number.clone(),
            self.cause_label().to_string(),
        ]
    }
}

impl Geotagged for User {
    fn location(&self) -> Option<Location> {
        self.location
    }

    fn popup(&self) -> Vec<String> {
        vec![
            self.name.clone(),
            self.institution.clone(),
            self.designation.clone(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub location: Location,
    pub popup: Vec<String>,
}

pub fn osm_link(location: Location, zoom: u8) -> String {
    format!(
        "https://www.openstreetmap.org/?mlat={lat}&mlon={lng}#map={zoom}/{lat}/{lng}",
        lat = location.lat,
        lng = location.lng,
        zoom = zoom
    )
}

#[derive(Debug, Clone)]
pub struct MapView {
    pub center: Location,
    pub zoom: u8,
    pub markers: Vec<Marker>,
}

impl MapView {
    /// Entities without a usable location get no marker
    pub fn new<T: Geotagged>(cfg: &MapConfig, entities: &[T]) -> Self {
        let markers: Vec<Marker> = entities
            .iter()
            .filter_map(|e| {
                let location = e.location().filter(Location::is_valid)?;
                Some(Marker {
                    location,
                    popup: e.popup(),
                })
            })
            .collect();
        let center = markers
            .first()
            .map(|m| m.location)
            .unwrap_or_else(|| cfg.fallback_center());

        Self {
            center,
            zoom: cfg.zoom(),
            markers,
        }
    }

    pub fn render(&self, title: &str) -> String {
        let mut out = format!(
            "{} map: {} marker{}, centered on {}\n{}\n",
            title,
            self.markers.len(),
            if self.markers.len() == 1 { "" } else { "s" },
            self.center,
            osm_link(self.center, self.zoom)
        );
        if self.markers.is_empty() {
            return out;
        }

        let rows: Vec<Vec<String>> = self
            .markers
            .iter()
            .enumerate()
            .map(|(i, m)| {
                vec![
                    (i + 1).to_string(),
                    table::truncate(&m.popup.join(" | "), 60),
                    m.location.to_string(),
                    osm_link(m.location, self.zoom),
                ]
            })
            .collect();
        out.push('\n');
        out.push_str(&table::render(&["#", "Details", "Location", "Link"], &rows));
        out
    }
}

const SOLVE_FIELDS: &[Field] = &[
    Field::text("solution", "Solution"),
    Field::text("solverName", "Solver Name"),
];

#[derive(Debug, Clone, Default)]
pub struct SolveForm {
    pub solution: String,
    pub solver_name: String,
}

impl Form for SolveForm {
    fn name(&self) -> &'static str {
        "solve"
    }

    fn fields(&self) -> &'static [Field] {
        SOLVE_FIELDS
    }

    fn set(&mut self, field: &str, value: &str) -> bool {
        match field {
            "solution" => self.solution = value.to_string(),
            "solverName" => self.solver_name = value.to_string(),
            _ => return false,
        }
        true
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        validation::required(
            &mut errors,
            "solution",
            &self.solution,
            "Solution is required",
        );
        validation::required(
            &mut errors,
            "solverName",
            &self.solver_name,
            "Solver name is required",
        );
        errors
    }
}

/// Mark report `id` solved; `reports` changes only after the server agrees
pub fn solve_report(
    api: &dyn ApiClient,
    reports: &mut [Report],
    id: &str,
    form: &SolveForm,
) -> Notice {
    let errors = form.validate();
    if let Some(first) = errors.first() {
        return Notice::error(first.message.clone());
    }

    let id = id.trim();
    let Some(report) = reports.iter_mut().find(|r| r.id == id) else {
        return Notice::error(format!("No report with id {}", id));
    };
    if report.is_solved {
        return Notice::error(format!("Report {} is already solved", id));
    }

    let update = SolveUpdate {
        is_solved: true,
        solution: form.solution.trim().to_string(),
        solver_name: form.solver_name.trim().to_string(),
    };
    match api.solve_report(id, &update) {
        Ok(()) => {
            report.is_solved = true;
            report.solution = Some(update.solution);
            report.solver_name = Some(update.solver_name);
            Notice::success("Report marked as solved")
        }
        Err(e) => match server_message(&e) {
            Some(msg) => Notice::error(format!("Failed to mark report as solved: {}", msg)),
            None => Notice::error("Failed to mark report as solved"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockApi;
    use crate::models::Role;

    fn report(id: &str, lat: f64, lng: f64) -> Report {
        Report {
            id: id.to_string(),
            name: "Asha".to_string(),
            mobile_number: "01812345678".to_string(),
            address: "Mirpur".to_string(),
            cause: "Other".to_string(),
            other_cause: Some("Transport".to_string()),
            location: Location::new(lat, lng),
            created_at: None,
            is_solved: false,
            solution: None,
            solver_name: None,
        }
    }

    fn form(solution: &str, solver: &str) -> SolveForm {
        SolveForm {
            solution: solution.to_string(),
            solver_name: solver.to_string(),
        }
    }

    #[test]
    fn test_empty_map_uses_fallback_center() {
        let view = MapView::new::<Report>(&MapConfig::default(), &[]);
        assert_eq!(view.center, Location::new(51.505, -0.09));
        assert_eq!(view.zoom, 6);
        assert!(view.markers.is_empty());
        assert!(view.render("Reports").contains("0 markers"));
    }

    #[test]
    fn test_center_on_first_entity() {
        let reports = vec![report("r1", 23.8, 90.36), report("r2", 22.3, 91.8)];
        let view = MapView::new(&MapConfig::default(), &reports);
        assert_eq!(view.center, Location::new(23.8, 90.36));
        assert_eq!(view.markers.len(), 2);
        assert_eq!(view.markers[0].popup, vec!["Asha", "01812345678", "Transport"]);
    }

    #[test]
    fn test_users_without_location_skipped() {
        let users = vec![
            User {
                name: "Rina".to_string(),
                email: "rina@x.org".to_string(),
                institution: "Dhaka Medical".to_string(),
                location: None,
                mobile_number: String::new(),
                designation: "Midwife".to_string(),
                role: Role::User,
                is_verified: true,
                is_blocked: false,
            },
            User {
                name: "Mita".to_string(),
                email: "mita@x.org".to_string(),
                institution: "Chittagong General".to_string(),
                location: Some(Location::new(22.35, 91.78)),
                mobile_number: String::new(),
                designation: "Nurse".to_string(),
                role: Role::User,
                is_verified: true,
                is_blocked: false,
            },
        ];
        let view = MapView::new(&MapConfig::default(), &users);
        assert_eq!(view.markers.len(), 1);
        assert_eq!(
            view.markers[0].popup,
            vec!["Mita", "Chittagong General", "Nurse"]
        );
        assert_eq!(view.center, Location::new(22.35, 91.78));
    }

    #[test]
    fn test_osm_link() {
        assert_eq!(
            osm_link(Location::new(23.8, 90.4), 6),
            "https://www.openstreetmap.org/?mlat=23.8&mlon=90.4#map=6/23.8/90.4"
        );
    }

    #[test]
    fn test_solve_requires_both_fields() {
        let api = MockApi::new();
        let mut reports = vec![report("r1", 23.8, 90.36)];

        let notice = solve_report(&api, &mut reports, "r1", &form("", "Dr. Karim"));
        assert_eq!(notice, Notice::error("Solution is required"));
        let notice = solve_report(&api, &mut reports, "r1", &form("Ambulance sent", " "));
        assert_eq!(notice, Notice::error("Solver name is required"));
        assert!(api.calls.borrow().is_empty());
        assert!(!reports[0].is_solved);
    }

    #[test]
    fn test_solve_updates_after_confirmation() {
        let api = MockApi::new();
        let mut reports = vec![report("r1", 23.8, 90.36)];

        let notice = solve_report(&api, &mut reports, "r1", &form("Ambulance sent", "Dr. Karim"));
        assert_eq!(notice, Notice::success("Report marked as solved"));
        assert!(reports[0].is_solved);
        assert_eq!(reports[0].solver_name.as_deref(), Some("Dr. Karim"));
        assert_eq!(api.calls.borrow().as_slice(), &["solve r1"]);
    }

    #[test]
    fn test_solve_rejects_unknown_and_solved() {
        let api = MockApi::new();
        let mut reports = vec![report("r1", 23.8, 90.36)];
        reports[0].is_solved = true;

        assert!(solve_report(&api, &mut reports, "r1", &form("a", "b")).is_error());
        assert!(solve_report(&api, &mut reports, "r9", &form("a", "b")).is_error());
        assert!(api.calls.borrow().is_empty());
    }

    #[test]
    fn test_failed_solve_leaves_report_open() {
        let api = MockApi::new();
        api.fail_with(500, Some("Report locked"));
        let mut reports = vec![report("r1", 23.8, 90.36)];

        let notice = solve_report(&api, &mut reports, "r1", &form("a", "b"));
        assert!(notice.message.contains("Report locked"));
        assert!(!reports[0].is_solved);
        assert!(reports[0].solution.is_none());
    }
}
