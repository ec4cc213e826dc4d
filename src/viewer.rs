//! Interface naar de render-backend, aangestuurd door [`crate::scene::Scene::render`].

use serde::Serialize;

use crate::math::Mat4;

/// Ondoorzichtige handle naar een object dat de viewer maakte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjectHandle(pub u32);

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialParams {
    pub ambient_intensity: f32,
    pub diffuse_color: [f32; 3],
    pub emissive_color: [f32; 3],
    pub shininess: f32,
    pub specular_color: [f32; 3],
    pub transparency: f32,
}

impl Default for MaterialParams {
    fn default() -> Self {
        Self {
            ambient_intensity: 0.2,
            diffuse_color: [0.8, 0.8, 0.8],
            emissive_color: [0.0; 3],
            shininess: 0.2,
            specular_color: [0.0; 3],
            transparency: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackgroundParams {
    pub ground_angle: Vec<f32>,
    pub ground_color: Vec<[f32; 3]>,
    pub sky_angle: Vec<f32>,
    pub sky_color: Vec<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointLightParams {
    pub ambient_intensity: f32,
    pub attenuation: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
    pub location: [f32; 3],
    pub radius: f32,
}

/// Aanroepen die de scene tijdens het renderen doet. Handles uit de
/// `insert_*`- en `begin_object`-aanroepen mogen later opnieuw uitgezonden
/// worden met [`Viewer::insert_reference`] tot ze verwijderd zijn.
pub trait Viewer {
    fn begin_object(&mut self, name: Option<&str>) -> ObjectHandle;
    fn end_object(&mut self);
    fn insert_reference(&mut self, object: ObjectHandle);
    fn remove_object(&mut self, object: ObjectHandle);

    fn transform(&mut self, matrix: &Mat4);
    fn set_material(&mut self, material: &MaterialParams);

    fn insert_box(&mut self, size: [f32; 3]) -> ObjectHandle;
    fn insert_sphere(&mut self, radius: f32) -> ObjectHandle;
    fn insert_cone(&mut self, height: f32, radius: f32, bottom: bool, side: bool) -> ObjectHandle;
    fn insert_cylinder(
        &mut self,
        height: f32,
        radius: f32,
        bottom: bool,
        side: bool,
        top: bool,
    ) -> ObjectHandle;

    fn insert_dir_light(
        &mut self,
        ambient_intensity: f32,
        intensity: f32,
        color: [f32; 3],
        direction: [f32; 3],
    ) -> ObjectHandle;
    fn insert_point_light(&mut self, light: &PointLightParams) -> ObjectHandle;

    fn insert_background(&mut self, background: &BackgroundParams) -> ObjectHandle;
    fn set_fog(&mut self, color: [f32; 3], visibility_range: f32, fog_type: &str);

    fn set_viewpoint(
        &mut self,
        position: [f32; 3],
        orientation: [f32; 4],
        field_of_view: f32,
        avatar_size: f32,
        visibility_limit: f32,
    );
    fn get_user_navigation(&self) -> Mat4;
    fn reset_user_navigation(&mut self);
}

/// Eén opgenomen viewer-aanroep.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ViewerCall {
    BeginObject {
        handle: ObjectHandle,
        name: Option<String>,
    },
    EndObject,
    InsertReference {
        handle: ObjectHandle,
    },
    RemoveObject {
        handle: ObjectHandle,
    },
    Transform {
        matrix: [[f64; 4]; 4],
    },
    SetMaterial {
        material: MaterialParams,
    },
    InsertBox {
        handle: ObjectHandle,
        size: [f32; 3],
    },
    InsertSphere {
        handle: ObjectHandle,
        radius: f32,
    },
    InsertCone {
        handle: ObjectHandle,
        height: f32,
        radius: f32,
    },
    InsertCylinder {
        handle: ObjectHandle,
        height: f32,
        radius: f32,
    },
    InsertDirLight {
        handle: ObjectHandle,
        ambient_intensity: f32,
        intensity: f32,
        color: [f32; 3],
        direction: [f32; 3],
    },
    InsertPointLight {
        handle: ObjectHandle,
        light: PointLightParams,
    },
    InsertBackground {
        handle: ObjectHandle,
        background: BackgroundParams,
    },
    SetFog {
        color: [f32; 3],
        visibility_range: f32,
        fog_type: String,
    },
    SetViewpoint {
        position: [f32; 3],
        orientation: [f32; 4],
        field_of_view: f32,
        avatar_size: f32,
        visibility_limit: f32,
    },
    ResetUserNavigation,
}

/// Een viewer die niets tekent en elke aanroep opneemt; gebruikt door de CLI,
/// de wasm-laag en de tests.
#[derive(Debug, Clone, Default)]
pub struct TraceViewer {
    calls: Vec<ViewerCall>,
    next_handle: u32,
    navigation: Mat4,
}

impl TraceViewer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn calls(&self) -> &[ViewerCall] {
        &self.calls
    }

    /// Geeft de opgenomen aanroepen terug en begint een nieuw spoor. De
    /// handle-nummering loopt door, zodat gecachete objecten geldig blijven.
    pub fn take_calls(&mut self) -> Vec<ViewerCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn set_user_navigation(&mut self, navigation: Mat4) {
        self.navigation = navigation;
    }

    fn handle(&mut self) -> ObjectHandle {
        self.next_handle += 1;
        ObjectHandle(self.next_handle)
    }
}

impl Viewer for TraceViewer {
    fn begin_object(&mut self, name: Option<&str>) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::BeginObject {
            handle,
            name: name.map(str::to_owned),
        });
        handle
    }

    fn end_object(&mut self) {
        self.calls.push(ViewerCall::EndObject);
    }

    fn insert_reference(&mut self, handle: ObjectHandle) {
        self.calls.push(ViewerCall::InsertReference { handle });
    }

    fn remove_object(&mut self, handle: ObjectHandle) {
        self.calls.push(ViewerCall::RemoveObject { handle });
    }

    fn transform(&mut self, matrix: &Mat4) {
        self.calls.push(ViewerCall::Transform {
            matrix: *matrix.as_matrix(),
        });
    }

    fn set_material(&mut self, material: &MaterialParams) {
        self.calls.push(ViewerCall::SetMaterial {
            material: material.clone(),
        });
    }

    fn insert_box(&mut self, size: [f32; 3]) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::InsertBox { handle, size });
        handle
    }

    fn insert_sphere(&mut self, radius: f32) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::InsertSphere { handle, radius });
        handle
    }

    fn insert_cone(&mut self, height: f32, radius: f32, _bottom: bool, _side: bool) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::InsertCone {
            handle,
            height,
            radius,
        });
        handle
    }

    fn insert_cylinder(
        &mut self,
        height: f32,
        radius: f32,
        _bottom: bool,
        _side: bool,
        _top: bool,
    ) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::InsertCylinder {
            handle,
            height,
            radius,
        });
        handle
    }

    fn insert_dir_light(
        &mut self,
        ambient_intensity: f32,
        intensity: f32,
        color: [f32; 3],
        direction: [f32; 3],
    ) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::InsertDirLight {
            handle,
            ambient_intensity,
            intensity,
            color,
            direction,
        });
        handle
    }

    fn insert_point_light(&mut self, light: &PointLightParams) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::InsertPointLight {
            handle,
            light: light.clone(),
        });
        handle
    }

    fn insert_background(&mut self, background: &BackgroundParams) -> ObjectHandle {
        let handle = self.handle();
        self.calls.push(ViewerCall::InsertBackground {
            handle,
            background: background.clone(),
        });
        handle
    }

    fn set_fog(&mut self, color: [f32; 3], visibility_range: f32, fog_type: &str) {
        self.calls.push(ViewerCall::SetFog {
            color,
            visibility_range,
            fog_type: fog_type.to_owned(),
        });
    }

    fn set_viewpoint(
        &mut self,
        position: [f32; 3],
        orientation: [f32; 4],
        field_of_view: f32,
        avatar_size: f32,
        visibility_limit: f32,
    ) {
        self.calls.push(ViewerCall::SetViewpoint {
            position,
            orientation,
            field_of_view,
            avatar_size,
            visibility_limit,
        });
    }

    fn get_user_navigation(&self) -> Mat4 {
        self.navigation
    }

    fn reset_user_navigation(&mut self) {
        self.navigation = Mat4::identity();
        self.calls.push(ViewerCall::ResetUserNavigation);
    }
}
