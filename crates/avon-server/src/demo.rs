//! Demo backend: a robot driving around a walled arena with a ranger on top

use avon_core::codec;
use avon_core::model::RANGER_SAMPLES_MAX;
use avon_core::{
    AccessorError, Bounds, Geom, InterfaceCallbacks, InterfaceType, Payload, Pva, RangerCfg,
    RangerData, RangerTransducerData, RegistryError, Sample, Transducer,
};
use avon_server::Avon;
use std::cell::RefCell;
use std::f64::consts::PI;
use std::rc::Rc;
use std::time::Duration;

/// Half the side length of the square arena, in meters
const ARENA_HALF: f64 = 5.0;
/// Distance kept from the walls before the robot turns around
const ROBOT_RADIUS: f64 = 0.3;
const RANGER_MAX_RANGE: f64 = 8.0;
const RANGER_FOV: f64 = PI;

pub const ROBOT: usize = 0;
pub const RANGER: usize = 1;

struct Body {
    name: &'static str,
    /// Pose in the parent's frame, velocity and acceleration in the local frame
    pva: Pva,
    extent: [f64; 3],
}

pub struct World {
    time_us: u64,
    bodies: Vec<Body>,
    beams: usize,
}

impl World {
    pub fn new(beams: usize) -> Self {
        let robot = Body {
            name: "robot1",
            pva: Pva {
                v: [0.5, 0.0, 0.0, 0.0, 0.0, 0.2],
                ..Default::default()
            },
            extent: [0.5, 0.4, 0.25],
        };
        let ranger = Body {
            name: "ranger1",
            pva: Pva {
                p: [0.15, 0.0, 0.2, 0.0, 0.0, 0.0],
                ..Default::default()
            },
            extent: [0.05, 0.05, 0.05],
        };
        Self {
            time_us: 0,
            bodies: vec![robot, ranger],
            beams: beams.clamp(1, RANGER_SAMPLES_MAX),
        }
    }

    pub fn time_us(&self) -> u64 {
        self.time_us
    }

    /// Advance the simulation by `dt`
    pub fn step(&mut self, dt: Duration) {
        self.time_us += dt.as_micros() as u64;
        let secs = dt.as_secs_f64();

        let robot = &mut self.bodies[ROBOT];
        let [x, y, _, _, _, yaw] = robot.pva.p;
        let (vx, wz) = (robot.pva.v[0], robot.pva.v[5]);

        let limit = ARENA_HALF - ROBOT_RADIUS;
        let mut nx = x + vx * yaw.cos() * secs;
        let mut ny = y + vx * yaw.sin() * secs;
        let mut nyaw = yaw + wz * secs;
        if nx.abs() > limit || ny.abs() > limit {
            nx = nx.clamp(-limit, limit);
            ny = ny.clamp(-limit, limit);
            nyaw += PI;
        }

        robot.pva.p[0] = nx;
        robot.pva.p[1] = ny;
        robot.pva.p[5] = normalize_angle(nyaw);
        for body in &mut self.bodies {
            body.pva.time = self.time_us;
        }
    }

    fn body(&self, idx: usize) -> Result<&Body, AccessorError> {
        self.bodies
            .get(idx)
            .ok_or_else(|| AccessorError::new(format!("no model with handle {}", idx)))
    }

    pub fn pva(&self, idx: usize) -> Result<Pva, AccessorError> {
        Ok(self.body(idx)?.pva)
    }

    pub fn set_pva(&mut self, idx: usize, pva: &Pva) -> Result<(), AccessorError> {
        if idx != ROBOT {
            return Err(AccessorError::new(format!(
                "{} is fixed to its parent",
                self.body(idx)?.name
            )));
        }
        self.bodies[ROBOT].pva = Pva {
            time: self.time_us,
            ..*pva
        };
        Ok(())
    }

    pub fn geom(&self, idx: usize) -> Result<Geom, AccessorError> {
        let body = self.body(idx)?;
        Ok(Geom {
            time: self.time_us,
            pose: [0.0; 6],
            extent: body.extent,
        })
    }

    fn bearings(&self) -> impl Iterator<Item = f64> + '_ {
        let step = if self.beams > 1 {
            RANGER_FOV / (self.beams - 1) as f64
        } else {
            0.0
        };
        let start = if self.beams > 1 { -RANGER_FOV / 2.0 } else { 0.0 };
        (0..self.beams).map(move |i| start + step * i as f64)
    }

    /// Cast the ranger beams against the arena walls
    pub fn scan(&self, idx: usize) -> Result<Sample, AccessorError> {
        if idx != RANGER {
            return Err(AccessorError::new("only the ranger can scan"));
        }
        let robot = &self.bodies[ROBOT].pva.p;
        let mount = self.bodies[RANGER].pva.p;
        let yaw = robot[5];
        let ox = robot[0] + mount[0] * yaw.cos() - mount[1] * yaw.sin();
        let oy = robot[1] + mount[0] * yaw.sin() + mount[1] * yaw.cos();

        let samples = self
            .bearings()
            .map(|bearing| {
                let range = distance_to_wall(ox, oy, yaw + mount[5] + bearing);
                if range > RANGER_MAX_RANGE {
                    [bearing, 0.0, RANGER_MAX_RANGE, 0.0]
                } else {
                    [bearing, 0.0, range, 1.0]
                }
            })
            .collect();

        Ok(Sample {
            time: self.time_us,
            interface: InterfaceType::Ranger,
            payload: Payload::RangerData(RangerData {
                transducers: vec![RangerTransducerData {
                    pose: mount,
                    samples,
                }],
            }),
        })
    }

    pub fn ranger_cfg(&self, idx: usize) -> Result<Sample, AccessorError> {
        if idx != RANGER {
            return Err(AccessorError::new("only the ranger has a configuration"));
        }
        let body = &self.bodies[RANGER];
        Ok(Sample {
            time: self.time_us,
            interface: InterfaceType::Ranger,
            payload: Payload::RangerCfg(RangerCfg {
                transducers: vec![Transducer {
                    geom: Geom {
                        time: self.time_us,
                        pose: body.pva.p,
                        extent: body.extent,
                    },
                    fov: [
                        Bounds {
                            min: -RANGER_FOV / 2.0,
                            max: RANGER_FOV / 2.0,
                        },
                        Bounds { min: 0.0, max: 0.0 },
                        Bounds {
                            min: 0.0,
                            max: RANGER_MAX_RANGE,
                        },
                    ],
                }],
            }),
        })
    }
}

fn normalize_angle(a: f64) -> f64 {
    let mut a = a % (2.0 * PI);
    if a > PI {
        a -= 2.0 * PI;
    } else if a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// Distance along a ray to the arena boundary
fn distance_to_wall(ox: f64, oy: f64, heading: f64) -> f64 {
    let (dy, dx) = heading.sin_cos();
    let mut t = f64::INFINITY;
    if dx.abs() > 1e-9 {
        let wall = if dx > 0.0 { ARENA_HALF } else { -ARENA_HALF };
        t = t.min((wall - ox) / dx);
    }
    if dy.abs() > 1e-9 {
        let wall = if dy > 0.0 { ARENA_HALF } else { -ARENA_HALF };
        t = t.min((wall - oy) / dy);
    }
    t.max(0.0)
}

/// Install the world's callbacks into `avon` and register its models
pub fn install(avon: &mut Avon<usize>, world: &Rc<RefCell<World>>) -> Result<(), RegistryError> {
    let w = world.clone();
    avon.install_clock_callback(move || w.borrow().time_us());

    let (pva_get, pva_set, geom_get) = (world.clone(), world.clone(), world.clone());
    avon.install_generic_callbacks(
        move |&h| pva_get.borrow().pva(h),
        move |&h, pva| pva_set.borrow_mut().set_pva(h, pva),
        move |&h| geom_get.borrow().geom(h),
        |_, _| Err(AccessorError::new("geometry is fixed in the demo world")),
    );

    let (scan, cfg) = (world.clone(), world.clone());
    avon.install_interface_callbacks(
        InterfaceType::Ranger,
        InterfaceCallbacks::default()
            .with_data_get(move |&h| scan.borrow().scan(h))
            .with_cfg_get(move |&h| cfg.borrow().ranger_cfg(h)),
    );
    avon.install_formatters(
        InterfaceType::Ranger,
        Some(Box::new(codec::format_ranger_data)),
        Some(Box::new(codec::format_ranger_cfg)),
    );

    avon.register_model("robot1", "pioneer2dx", InterfaceType::Position2d, None, ROBOT)?;
    avon.register_model("ranger1", "sicklms200", InterfaceType::Ranger, Some("robot1"), RANGER)?;
    Ok(())
}
