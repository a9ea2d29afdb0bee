use std::collections::HashMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use anyhow::{anyhow, Result};

use crate::domain::Domain;
use crate::expression::Expression;

/// Lightweight handle to a pin registered in a [`Circuit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinId(pub usize);

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// A named connection point, the basic reference for voltages and currents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub name: String,
    pub id: PinId,
}

impl Pin {
    pub fn new(name: String, id: PinId) -> Self {
        Pin { name, id }
    }

    pub fn is_ground(&self) -> bool {
        self.name == "0" || self.name.to_lowercase() == "gnd" || self.name.to_lowercase() == "ground"
    }
}

/// Voltage difference between an upper and a lower pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Voltage {
    pub upper: PinId,
    pub lower: PinId,
}

impl Voltage {
    pub fn new(upper: PinId, lower: PinId) -> Self {
        Voltage { upper, lower }
    }

    pub fn reversed(&self) -> Self {
        Voltage::new(self.lower, self.upper)
    }
}

/// Current flowing from a source pin to a destination pin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Current {
    pub src: PinId,
    pub dst: PinId,
}

impl Current {
    pub fn new(src: PinId, dst: PinId) -> Self {
        Current { src, dst }
    }

    pub fn reversed(&self) -> Self {
        Current::new(self.dst, self.src)
    }
}

/// Anything with pins that relates the voltage across and the current
/// through a pair of them.
///
/// Relations are returned as time-domain expressions; the caller converts
/// them with [`Expression::to_frequency`] when it needs impedance form.
pub trait Element {
    fn name(&self) -> &str;

    fn pins(&self) -> [PinId; 2];

    fn voltage_between(&self, upper: PinId, lower: PinId) -> Result<Expression>;

    fn current_between(&self, src: PinId, dst: PinId) -> Result<Expression>;
}

/// Kinds of two-terminal components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    Resistor,
    Capacitor,
    Inductor,
    VoltageSource,
    CurrentSource,
}

impl ComponentKind {
    /// Returns true if this component is a source
    pub fn is_source(&self) -> bool {
        matches!(self, ComponentKind::VoltageSource | ComponentKind::CurrentSource)
    }

    /// Returns true if the relation involves a time derivative or integral
    pub fn is_reactive(&self) -> bool {
        matches!(self, ComponentKind::Capacitor | ComponentKind::Inductor)
    }

    fn label(&self) -> &'static str {
        match self {
            ComponentKind::Resistor => "Resistors",
            ComponentKind::Capacitor => "Capacitors",
            ComponentKind::Inductor => "Inductors",
            ComponentKind::VoltageSource => "Voltage Sources",
            ComponentKind::CurrentSource => "Current Sources",
        }
    }
}

/// Two-terminal circuit component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    pub pins: [PinId; 2],
    pub value: f64,
}

impl Component {
    pub fn new(name: String, kind: ComponentKind, positive: PinId, negative: PinId, value: f64) -> Self {
        Component {
            name,
            kind,
            pins: [positive, negative],
            value,
        }
    }

    /// Validate the component value
    pub fn validate(&self) -> Result<()> {
        if self.pins[0] == self.pins[1] {
            return Err(anyhow!("Component {} has both terminals on the same pin", self.name));
        }

        match self.kind {
            ComponentKind::Resistor if self.value <= 0.0 => {
                Err(anyhow!("Resistor {} must have positive resistance", self.name))
            }
            ComponentKind::Capacitor if self.value <= 0.0 => {
                Err(anyhow!("Capacitor {} must have positive capacitance", self.name))
            }
            ComponentKind::Inductor if self.value <= 0.0 => {
                Err(anyhow!("Inductor {} must have positive inductance", self.name))
            }
            _ => Ok(()),
        }
    }

    /// Orientation of a pin pair relative to the component terminals:
    /// `1.0` for (positive, negative), `-1.0` for the reverse.
    fn orientation(&self, a: PinId, b: PinId) -> Result<f64> {
        let [p, n] = self.pins;
        if a == p && b == n {
            Ok(1.0)
        } else if a == n && b == p {
            Ok(-1.0)
        } else {
            Err(anyhow!(
                "Pins {} and {} are not the terminals of component {}",
                a,
                b,
                self.name
            ))
        }
    }

    fn terminal_voltage(&self) -> Expression {
        Expression::voltage(Voltage::new(self.pins[0], self.pins[1]), Domain::Time)
    }

    fn terminal_current(&self) -> Expression {
        Expression::current(Current::new(self.pins[0], self.pins[1]), Domain::Time)
    }

    fn oriented(sign: f64, relation: Expression) -> Expression {
        if sign < 0.0 {
            relation.negated()
        } else {
            relation
        }
    }
}

impl Element for Component {
    fn name(&self) -> &str {
        &self.name
    }

    fn pins(&self) -> [PinId; 2] {
        self.pins
    }

    fn voltage_between(&self, upper: PinId, lower: PinId) -> Result<Expression> {
        let sign = self.orientation(upper, lower)?;
        let relation = match self.kind {
            // v = R i
            ComponentKind::Resistor => Expression::constant(self.value) * self.terminal_current(),
            // v = (1/C) ∫ i dt
            ComponentKind::Capacitor => {
                Expression::constant(1.0 / self.value) * Expression::running_integral(self.terminal_current())
            }
            // v = L di/dt
            ComponentKind::Inductor => {
                Expression::constant(self.value) * Expression::derivative(self.terminal_current())
            }
            ComponentKind::VoltageSource => Expression::constant(self.value),
            ComponentKind::CurrentSource => {
                return Err(anyhow!(
                    "Voltage across current source {} is set by the rest of the circuit",
                    self.name
                ))
            }
        };
        Ok(Component::oriented(sign, relation))
    }

    fn current_between(&self, src: PinId, dst: PinId) -> Result<Expression> {
        let sign = self.orientation(src, dst)?;
        let relation = match self.kind {
            ComponentKind::Resistor => Expression::constant(1.0 / self.value) * self.terminal_voltage(),
            // i = C dv/dt
            ComponentKind::Capacitor => {
                Expression::constant(self.value) * Expression::derivative(self.terminal_voltage())
            }
            // i = (1/L) ∫ v dt
            ComponentKind::Inductor => {
                Expression::constant(1.0 / self.value) * Expression::running_integral(self.terminal_voltage())
            }
            ComponentKind::CurrentSource => Expression::constant(self.value),
            ComponentKind::VoltageSource => {
                return Err(anyhow!(
                    "Current through voltage source {} is set by the rest of the circuit",
                    self.name
                ))
            }
        };
        Ok(Component::oriented(sign, relation))
    }
}

/// Pins and components referenced by expressions.
///
/// Expressions only hold [`PinId`] handles; the circuit must outlive any
/// rendering or lookup done through it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Circuit {
    pub title: String,
    pub pins: Vec<Pin>,
    pub components: Vec<Component>,
    pub pin_map: HashMap<String, PinId>,
}

impl Circuit {
    pub fn new(title: String) -> Self {
        Circuit {
            title,
            pins: Vec::new(),
            components: Vec::new(),
            pin_map: HashMap::new(),
        }
    }

    /// Add a pin to the circuit and return its handle
    pub fn add_pin(&mut self, name: &str) -> PinId {
        if let Some(&existing) = self.pin_map.get(name) {
            return existing;
        }

        let id = PinId(self.pins.len());
        self.pins.push(Pin::new(name.to_string(), id));
        self.pin_map.insert(name.to_string(), id);
        id
    }

    /// Add a component between two named pins, registering the pins as needed
    pub fn add_component(
        &mut self,
        name: &str,
        kind: ComponentKind,
        positive: &str,
        negative: &str,
        value: f64,
    ) -> Result<&Component> {
        if self.components.iter().any(|c| c.name == name) {
            return Err(anyhow!("Duplicate component name '{}'", name));
        }

        // Ids the pins will get once registered
        let next = PinId(self.pins.len());
        let positive_id = self.pin_id(positive).unwrap_or(next);
        let negative_id = match self.pin_id(negative) {
            Some(id) => id,
            None if negative == positive => positive_id,
            None if positive_id == next => PinId(next.0 + 1),
            None => next,
        };
        let component = Component::new(name.to_string(), kind, positive_id, negative_id, value);
        component.validate()?;

        self.add_pin(positive);
        self.add_pin(negative);

        self.components.push(component);
        Ok(&self.components[self.components.len() - 1])
    }

    pub fn pin(&self, id: PinId) -> Option<&Pin> {
        self.pins.get(id.0)
    }

    pub fn pin_id(&self, name: &str) -> Option<PinId> {
        self.pin_map.get(name).copied()
    }

    pub fn pin_name(&self, id: PinId) -> Option<&str> {
        self.pin(id).map(|pin| pin.name.as_str())
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.name == name)
    }

    /// Voltage identity between two registered pins
    pub fn voltage(&self, upper: &str, lower: &str) -> Result<Voltage> {
        Ok(Voltage::new(self.require_pin(upper)?, self.require_pin(lower)?))
    }

    /// Current identity between two registered pins
    pub fn current(&self, src: &str, dst: &str) -> Result<Current> {
        Ok(Current::new(self.require_pin(src)?, self.require_pin(dst)?))
    }

    fn require_pin(&self, name: &str) -> Result<PinId> {
        self.pin_id(name)
            .ok_or_else(|| anyhow!("Pin {} not found", name))
    }

    /// Get all reactive components (L, C)
    pub fn reactive_components(&self) -> Vec<&Component> {
        self.components
            .iter()
            .filter(|comp| comp.kind.is_reactive())
            .collect()
    }

    /// Validate the entire circuit
    pub fn validate(&self) -> Result<()> {
        for component in &self.components {
            component.validate()?;
            for pin in component.pins {
                if self.pin(pin).is_none() {
                    return Err(anyhow!("Component {} references unknown pin {}", component.name, pin));
                }
            }
        }
        Ok(())
    }

    /// Print circuit summary
    pub fn print_summary(&self) {
        println!("Circuit: {}", self.title);
        println!("Pins: {}", self.pins.len());
        println!("Components: {}", self.components.len());

        let mut kind_counts = HashMap::new();
        for component in &self.components {
            *kind_counts.entry(component.kind.label()).or_insert(0) += 1;
        }

        for (kind, count) in kind_counts {
            println!("  {}: {}", kind, count);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_registration() {
        let mut circuit = Circuit::new("Test Circuit".to_string());

        let a = circuit.add_pin("a");
        let b = circuit.add_pin("b");
        let again = circuit.add_pin("a");

        assert_eq!(a, PinId(0));
        assert_eq!(b, PinId(1));
        assert_eq!(again, a);
        assert_eq!(circuit.pin_name(b), Some("b"));
        assert!(circuit.pin(PinId(7)).is_none());
        assert!(Pin::new("gnd".to_string(), PinId(3)).is_ground());
    }

    #[test]
    fn test_voltage_lookup() {
        let mut circuit = Circuit::new("Test Circuit".to_string());
        circuit.add_pin("in");
        circuit.add_pin("0");

        let v = circuit.voltage("in", "0").unwrap();
        assert_eq!(v, Voltage::new(PinId(0), PinId(1)));
        assert_eq!(v.reversed(), Voltage::new(PinId(1), PinId(0)));
        assert!(circuit.current("in", "missing").is_err());
    }

    #[test]
    fn test_component_validation() {
        let mut circuit = Circuit::new("Test Circuit".to_string());
        assert!(circuit.add_component("R1", ComponentKind::Resistor, "1", "0", 1000.0).is_ok());
        assert!(circuit.add_component("R1", ComponentKind::Resistor, "1", "0", 10.0).is_err());
        assert!(circuit.add_component("C1", ComponentKind::Capacitor, "1", "0", -1e-9).is_err());
        assert!(circuit.add_component("L1", ComponentKind::Inductor, "2", "2", 1e-3).is_err());
        assert!(circuit.validate().is_ok());
        assert_eq!(circuit.components.len(), 1);

        // Rejected components leave no pins behind
        assert_eq!(circuit.pins.len(), 2);
        assert_eq!(circuit.pin_id("2"), None);
        assert!(circuit.add_component("C2", ComponentKind::Capacitor, "3", "4", 0.0).is_err());
        assert_eq!(circuit.pins.len(), 2);

        let cap = circuit.add_component("C3", ComponentKind::Capacitor, "3", "1", 1e-6).unwrap();
        assert_eq!(cap.pins, [PinId(2), PinId(0)]);
        let ind = circuit.add_component("L2", ComponentKind::Inductor, "5", "6", 1e-3).unwrap();
        assert_eq!(ind.pins, [PinId(3), PinId(4)]);
    }

    #[test]
    fn test_resistor_relations() {
        let mut circuit = Circuit::new("Divider".to_string());
        circuit.add_component("R1", ComponentKind::Resistor, "1", "0", 1000.0).unwrap();
        let r1 = circuit.component("R1").unwrap();
        let [p, n] = r1.pins();

        let v = r1.voltage_between(p, n).unwrap();
        let expected = Expression::constant(1000.0) * Expression::current(Current::new(p, n), Domain::Time);
        assert_eq!(v, expected);
        assert_eq!(v.domain().unwrap(), Domain::Time);

        let reversed = r1.voltage_between(n, p).unwrap();
        assert_eq!(reversed, expected.negated());
    }

    #[test]
    fn test_capacitor_relations() {
        let mut circuit = Circuit::new("RC".to_string());
        circuit.add_component("C1", ComponentKind::Capacitor, "out", "0", 2.0).unwrap();
        let c1 = circuit.component("C1").unwrap();
        let [p, n] = c1.pins();
        let v = Expression::voltage(Voltage::new(p, n), Domain::Time);

        let i = c1.current_between(p, n).unwrap();
        assert_eq!(i, Expression::constant(2.0) * Expression::derivative(v.clone()));

        // Admittance form: I = C s V
        let admittance = i.to_frequency().unwrap();
        let expected = Expression::constant(2.0)
            * (Expression::frequency() * Expression::voltage(Voltage::new(p, n), Domain::Frequency));
        assert_eq!(admittance, expected);

        let voltage = c1.voltage_between(p, n).unwrap();
        assert_eq!(voltage.domain().unwrap(), Domain::Time);
        assert!(voltage.to_frequency().is_ok());
    }

    #[test]
    fn test_sources_and_foreign_pins() {
        let mut circuit = Circuit::new("Sources".to_string());
        circuit.add_component("V1", ComponentKind::VoltageSource, "1", "0", 5.0).unwrap();
        circuit.add_component("I1", ComponentKind::CurrentSource, "2", "0", 1e-3).unwrap();
        let stray = circuit.add_pin("3");

        let v1 = circuit.component("V1").unwrap();
        let [p, n] = v1.pins();
        assert_eq!(v1.voltage_between(p, n).unwrap(), Expression::constant(5.0));
        assert_eq!(v1.voltage_between(n, p).unwrap(), Expression::constant(-5.0));
        assert!(v1.current_between(p, n).is_err());
        assert!(v1.voltage_between(p, stray).is_err());

        let i1 = circuit.component("I1").unwrap();
        let [p, n] = i1.pins();
        assert_eq!(i1.current_between(p, n).unwrap().domain().unwrap(), Domain::Invariant);
        assert!(i1.voltage_between(p, n).is_err());
    }

    #[test]
    fn test_inductor_relations() {
        let mut circuit = Circuit::new("RL".to_string());
        circuit.add_component("L1", ComponentKind::Inductor, "a", "b", 0.5).unwrap();
        assert_eq!(circuit.reactive_components().len(), 1);

        let l1 = circuit.component("L1").unwrap();
        let [p, n] = l1.pins();
        let i = l1.current_between(p, n).unwrap();
        let expected = Expression::constant(2.0)
            * Expression::running_integral(Expression::voltage(Voltage::new(p, n), Domain::Time));
        assert_eq!(i, expected);
    }
}
