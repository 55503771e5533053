use indicatif::ProgressBar;

use crate::{
    backend::{FemBackend, GeometryId, UnknownSet},
    conditions,
    datatypes::Element,
    engine::GeometryEngine,
    error::EmbedfemError,
    mesh::TriangleMesh,
    quadrature,
    settings::{BackgroundGrid, Settings},
    stl::read_stl,
};

/// Element type instantiated for every quadrature geometry
pub const ELEMENT_TYPE: &str = "SmallDisplacementElement3D8N";
/// Integration order passed along with quadrature point geometries
pub const QUADRATURE_GEOMETRY_ORDER: usize = 2;
pub const MATERIAL_ID: usize = 1;

/// Creates the background volume geometry on the backend and returns its id
pub type DomainSetup<B> = Box<dyn FnMut(&BackgroundGrid, &mut B) -> Result<GeometryId, EmbedfemError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Configured,
    GeometryReady,
    Assembled,
}

/// Counts reported after an assembly
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblySummary {
    pub elements: usize,
    pub conditions: usize,
    pub volume: f64,
}

/// Drives the model assembly: domain setup, classification, and the
/// installation of elements, unknowns and conditions into the backend
pub struct Orchestrator<B: FemBackend> {
    settings: Settings,
    backend: B,
    engine: Box<dyn GeometryEngine>,
    domain_setup: DomainSetup<B>,
    requires_multipliers: bool,
    state: AssemblyState,
    parent: Option<GeometryId>,
    elements: Vec<Element>,
}

impl<B: FemBackend> Orchestrator<B> {
    /// Creates the orchestrator and registers the solution variables
    ///
    /// # Arguments
    /// * `settings` - The analysis settings
    /// * `backend` - The backend owning the domain
    /// * `engine` - The geometry engine
    /// * `domain_setup` - Creates the background volume geometry
    pub fn new(
        settings: Settings,
        mut backend: B,
        engine: Box<dyn GeometryEngine>,
        domain_setup: DomainSetup<B>,
    ) -> Orchestrator<B> {
        let requires_multipliers = settings.requires_multipliers();
        backend.register_variables(&UnknownSet::for_analysis(requires_multipliers));

        if requires_multipliers {
            log::info!("lagrange support present, registering multiplier variables");
        }

        Orchestrator {
            settings,
            backend,
            engine,
            domain_setup,
            requires_multipliers,
            state: AssemblyState::Configured,
            parent: None,
            elements: Vec::new(),
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn requires_multipliers(&self) -> bool {
        self.requires_multipliers
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    /// Elements produced by the last classification
    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    /// Reads the embedded surface from the general input file, then runs
    /// `setup_geometry_with_mesh`
    pub fn setup_geometry(&mut self) -> Result<(), EmbedfemError> {
        let embedded_mesh = read_stl(&self.settings.general.input_filename)?;
        self.setup_geometry_with_mesh(&embedded_mesh)
    }

    /// Creates the background volume and classifies the grid against the
    /// embedded surface
    pub fn setup_geometry_with_mesh(
        &mut self,
        embedded_mesh: &TriangleMesh,
    ) -> Result<(), EmbedfemError> {
        if self.state != AssemblyState::Configured {
            return Err(EmbedfemError::Configuration(
                "Geometry has already been set up".to_owned(),
            ));
        }

        let parent = (self.domain_setup)(&self.settings.grid, &mut self.backend)?;
        self.elements = self
            .engine
            .classify_elements(&self.settings.grid.bounds, embedded_mesh)?;

        log::info!("classified {} background elements", self.elements.len());

        self.parent = Some(parent);
        self.state = AssemblyState::GeometryReady;
        Ok(())
    }

    /// Rebuilds the element and condition collections of the domain
    ///
    /// Existing elements and conditions are removed first, so running this
    /// again yields the same collections.
    ///
    /// # Returns
    /// Counts of the installed entities
    pub fn modify_initial_geometry(&mut self) -> Result<AssemblySummary, EmbedfemError> {
        let parent = match (self.state, self.parent) {
            (AssemblyState::GeometryReady | AssemblyState::Assembled, Some(p)) => p,
            _ => {
                return Err(EmbedfemError::Configuration(
                    "Geometry must be set up before assembly".to_owned(),
                ))
            }
        };

        self.backend.remove_all_elements();
        self.backend.remove_all_conditions();

        let quadratures = quadrature::convert(&self.elements);
        if quadratures.is_empty() {
            return Err(EmbedfemError::IntegrationData(format!(
                "None of the {} classified elements has integration points in the physical domain",
                self.elements.len()
            )));
        }

        let bar = if self.settings.general.echo_level > 0 {
            ProgressBar::new(quadratures.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        let mut volume = 0.0;
        for quadrature in &quadratures {
            let geometry = self.backend.create_composite_geometry(
                parent,
                QUADRATURE_GEOMETRY_ORDER,
                &quadrature.points,
            )?;
            self.backend
                .create_element(ELEMENT_TYPE, quadrature.id, geometry, MATERIAL_ID)?;
            volume += quadrature.total_weight();
            bar.inc(1);
        }
        bar.finish_and_clear();
        log::info!(
            "installed {} elements with total weight {:.6}",
            quadratures.len(),
            volume
        );

        for dof in UnknownSet::for_analysis(self.requires_multipliers).dofs() {
            self.backend.declare_unknown(*dof)?;
        }

        let conditions = conditions::dispatch(
            &self.settings.conditions,
            self.engine.as_mut(),
            &self.settings.grid.bounds,
            self.backend.declared_unknowns(),
        )?;
        for condition in &conditions {
            let geometry = self.backend.create_composite_geometry(
                parent,
                QUADRATURE_GEOMETRY_ORDER,
                &[condition.integration_point()],
            )?;
            self.backend.create_condition(
                condition.kind_tag,
                condition.id,
                geometry,
                MATERIAL_ID,
                &condition.values,
            )?;
        }
        log::info!("installed {} conditions", conditions.len());

        self.state = AssemblyState::Assembled;
        Ok(AssemblySummary {
            elements: quadratures.len(),
            conditions: conditions.len(),
            volume,
        })
    }
}
